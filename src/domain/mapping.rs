use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::issue::{IssuePriority, IssueState, TShirtSizeEstimation};
use crate::error::{AppError, AppResult};

/// One-to-one table between a generic game value and the tracker's name for it.
///
/// Tracker names must stay distinct ignoring case; a table loaded from JSON
/// with two values sharing a tracker name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<G, String>",
    try_from = "BTreeMap<G, String>"
)]
#[serde(bound(
    serialize = "G: Ord + Clone + Display + Serialize",
    deserialize = "G: Ord + Clone + Display + Deserialize<'de>"
))]
pub struct VocabularyMap<G: Ord + Clone> {
    entries: BTreeMap<G, String>,
}

impl<G: Ord + Clone + Display> TryFrom<BTreeMap<G, String>> for VocabularyMap<G> {
    type Error = AppError;

    fn try_from(entries: BTreeMap<G, String>) -> AppResult<Self> {
        for (index, (generic, name)) in entries.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(AppError::Configuration(format!(
                    "'{generic}' maps to an empty tracker name"
                )));
            }
            if let Some((other, _)) = entries
                .iter()
                .skip(index + 1)
                .find(|(_, other)| other.trim().eq_ignore_ascii_case(name.trim()))
            {
                return Err(AppError::Configuration(format!(
                    "'{generic}' and '{other}' both map to tracker value '{name}'"
                )));
            }
        }
        Ok(Self { entries })
    }
}

impl<G: Ord + Clone> From<VocabularyMap<G>> for BTreeMap<G, String> {
    fn from(map: VocabularyMap<G>) -> Self {
        map.entries
    }
}

impl<G: Ord + Clone> Default for VocabularyMap<G> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<G: Ord + Clone> VocabularyMap<G> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, generic: G, vendor: impl Into<String>) -> Self {
        self.entries.insert(generic, vendor.into());
        self
    }

    pub fn to_vendor(&self, generic: &G) -> Option<&str> {
        self.entries.get(generic).map(String::as_str)
    }

    /// Vendor names are compared case-insensitively; trackers are not
    /// consistent about casing between their read and write APIs. A name
    /// shared by several values resolves to none of them.
    pub fn to_generic(&self, vendor: &str) -> Option<G> {
        let vendor = vendor.trim();
        let mut matches = self
            .entries
            .iter()
            .filter(|(_, name)| name.trim().eq_ignore_ascii_case(vendor))
            .map(|(generic, _)| generic);
        let generic = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(generic.clone()),
        }
    }

    pub fn supported(&self) -> impl Iterator<Item = &G> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub states: VocabularyMap<IssueState>,
    #[serde(default)]
    pub priorities: VocabularyMap<IssuePriority>,
    #[serde(default)]
    pub estimations: VocabularyMap<TShirtSizeEstimation>,
    #[serde(default)]
    pub issue_types: VocabularyMap<String>,
    #[serde(default)]
    pub users: VocabularyMap<Uuid>,
}

/// Per-project, per-connector description of how the game's vocabulary maps
/// onto a tracker.
///
/// Implementors only supply the project and the tables; the translation
/// helpers are shared so every connector fails the same way on a gap.
pub trait IssueMappingConfiguration: Send + Sync {
    fn project_id(&self) -> Uuid;

    fn vocabulary(&self) -> &Vocabulary;

    fn vendor_state(&self, state: IssueState) -> AppResult<&str> {
        require("issue state", &state, self.vocabulary().states.to_vendor(&state))
    }

    fn vendor_priority(&self, priority: IssuePriority) -> AppResult<&str> {
        require(
            "issue priority",
            &priority,
            self.vocabulary().priorities.to_vendor(&priority),
        )
    }

    fn vendor_estimation(&self, estimation: TShirtSizeEstimation) -> AppResult<&str> {
        require(
            "estimation",
            &estimation,
            self.vocabulary().estimations.to_vendor(&estimation),
        )
    }

    fn vendor_issue_type(&self, type_name: &str) -> AppResult<&str> {
        let vocabulary = &self.vocabulary().issue_types;
        let generic = vocabulary
            .supported()
            .find(|name| name.eq_ignore_ascii_case(type_name.trim()));
        require(
            "issue type",
            &type_name,
            generic.and_then(|name| vocabulary.to_vendor(name)),
        )
    }

    fn vendor_user(&self, user_id: Uuid) -> AppResult<&str> {
        require("assignee", &user_id, self.vocabulary().users.to_vendor(&user_id))
    }

    fn generic_state(&self, vendor: &str) -> AppResult<IssueState> {
        self.vocabulary()
            .states
            .to_generic(vendor)
            .ok_or_else(|| AppError::unmapped("tracker state", vendor))
    }

    fn generic_priority(&self, vendor: &str) -> Option<IssuePriority> {
        self.vocabulary().priorities.to_generic(vendor)
    }

    fn generic_estimation(&self, vendor: &str) -> Option<TShirtSizeEstimation> {
        self.vocabulary().estimations.to_generic(vendor)
    }

    /// Unknown tracker types pass through unchanged so issues created outside
    /// the game remain readable.
    fn generic_issue_type(&self, vendor: &str) -> String {
        self.vocabulary()
            .issue_types
            .to_generic(vendor)
            .unwrap_or_else(|| vendor.to_string())
    }

    fn generic_user(&self, vendor: &str) -> Option<Uuid> {
        self.vocabulary().users.to_generic(vendor)
    }
}

fn require<'a>(
    kind: &'static str,
    generic: &dyn Display,
    vendor: Option<&'a str>,
) -> AppResult<&'a str> {
    vendor.ok_or_else(|| AppError::unmapped(kind, generic))
}
