use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueState {
    Backlog,
    Todo,
    InProgress,
    InReview,
    Done,
}

impl IssueState {
    pub const ALL: [IssueState; 5] = [
        IssueState::Backlog,
        IssueState::Todo,
        IssueState::InProgress,
        IssueState::InReview,
        IssueState::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Backlog => "BACKLOG",
            IssueState::Todo => "TODO",
            IssueState::InProgress => "IN_PROGRESS",
            IssueState::InReview => "IN_REVIEW",
            IssueState::Done => "DONE",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        let normalized = normalize(value);
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssuePriority {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

impl IssuePriority {
    pub const ALL: [IssuePriority; 5] = [
        IssuePriority::Lowest,
        IssuePriority::Low,
        IssuePriority::Medium,
        IssuePriority::High,
        IssuePriority::Highest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Lowest => "LOWEST",
            IssuePriority::Low => "LOW",
            IssuePriority::Medium => "MEDIUM",
            IssuePriority::High => "HIGH",
            IssuePriority::Highest => "HIGHEST",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        let normalized = normalize(value);
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == normalized)
    }
}

/// Relative size of an issue, the only estimation scale the game knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TShirtSizeEstimation {
    #[serde(rename = "XS")]
    Xs,
    #[serde(rename = "S")]
    S,
    #[serde(rename = "M")]
    M,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "XL")]
    Xl,
    #[serde(rename = "XXL")]
    Xxl,
}

impl TShirtSizeEstimation {
    pub const ALL: [TShirtSizeEstimation; 6] = [
        TShirtSizeEstimation::Xs,
        TShirtSizeEstimation::S,
        TShirtSizeEstimation::M,
        TShirtSizeEstimation::L,
        TShirtSizeEstimation::Xl,
        TShirtSizeEstimation::Xxl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TShirtSizeEstimation::Xs => "XS",
            TShirtSizeEstimation::S => "S",
            TShirtSizeEstimation::M => "M",
            TShirtSizeEstimation::L => "L",
            TShirtSizeEstimation::Xl => "XL",
            TShirtSizeEstimation::Xxl => "XXL",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        let normalized = normalize(value);
        Self::ALL
            .into_iter()
            .find(|size| size.as_str() == normalized)
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(IssueState, IssuePriority, TShirtSizeEstimation);

fn normalize(value: &str) -> String {
    value.trim().to_uppercase().replace([' ', '-'], "_")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub state: IssueState,
    pub priority: Option<IssuePriority>,
    pub issue_type: String,
    pub sprint_number: Option<u32>,
    pub estimation: Option<TShirtSizeEstimation>,
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Caller-supplied data for a new issue. Unset optional fields are left to
/// the tracker's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateIssueInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub issue_type: String,
    #[serde(default)]
    pub state: Option<IssueState>,
    #[serde(default)]
    pub priority: Option<IssuePriority>,
    #[serde(default)]
    pub estimation: Option<TShirtSizeEstimation>,
    #[serde(default)]
    pub sprint_number: Option<u32>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
}

impl CreateIssueInput {
    pub fn new(title: impl Into<String>, issue_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            issue_type: issue_type.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_names_loosely() {
        assert_eq!(IssueState::from_str("in progress"), Some(IssueState::InProgress));
        assert_eq!(IssueState::from_str("IN-REVIEW"), Some(IssueState::InReview));
        assert_eq!(IssueState::from_str("done"), Some(IssueState::Done));
        assert_eq!(IssueState::from_str("closed"), None);
    }

    #[test]
    fn parses_estimation_sizes() {
        assert_eq!(TShirtSizeEstimation::from_str("xl"), Some(TShirtSizeEstimation::Xl));
        assert_eq!(TShirtSizeEstimation::from_str("XXXL"), None);
    }

    #[test]
    fn serializes_vocabulary_in_screaming_case() {
        let json = serde_json::to_string(&IssueState::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let json = serde_json::to_string(&TShirtSizeEstimation::Xxl).unwrap();
        assert_eq!(json, "\"XXL\"");
    }
}
