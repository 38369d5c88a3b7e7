use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueEventType {
    IssueCreated,
    IssueTitleChanged,
    IssueDescriptionChanged,
    IssueStateChanged,
    IssuePriorityChanged,
    IssueTypeChanged,
    IssueSprintChanged,
    IssueEstimationChanged,
    IssueAssigned,
    IssueCommented,
}

impl IssueEventType {
    pub fn identifier(&self) -> &'static str {
        match self {
            IssueEventType::IssueCreated => "ISSUE_CREATED",
            IssueEventType::IssueTitleChanged => "ISSUE_TITLE_CHANGED",
            IssueEventType::IssueDescriptionChanged => "ISSUE_DESCRIPTION_CHANGED",
            IssueEventType::IssueStateChanged => "ISSUE_STATE_CHANGED",
            IssueEventType::IssuePriorityChanged => "ISSUE_PRIORITY_CHANGED",
            IssueEventType::IssueTypeChanged => "ISSUE_TYPE_CHANGED",
            IssueEventType::IssueSprintChanged => "ISSUE_SPRINT_CHANGED",
            IssueEventType::IssueEstimationChanged => "ISSUE_ESTIMATION_CHANGED",
            IssueEventType::IssueAssigned => "ISSUE_ASSIGNED",
            IssueEventType::IssueCommented => "ISSUE_COMMENTED",
        }
    }
}

impl fmt::Display for IssueEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventField {
    pub key: String,
    pub value: String,
}

impl EventField {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A tracker-side change translated into the game's vocabulary, ready to be
/// appended to the game's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventInput {
    pub event_type: IssueEventType,
    pub project_id: Uuid,
    pub issue_id: String,
    pub user_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub data: Vec<EventField>,
}

impl CreateEventInput {
    pub fn new(
        event_type: IssueEventType,
        project_id: Uuid,
        issue_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            project_id,
            issue_id: issue_id.into(),
            user_id: None,
            timestamp,
            message: String::new(),
            data: Vec::new(),
        }
    }

    pub fn by(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.push(EventField::new(key, value));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }

    /// Content hash used to recognize an event that was already delivered.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.event_type.identifier().as_bytes());
        hasher.update(self.issue_id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        if let Some(user_id) = self.user_id {
            hasher.update(user_id.as_bytes());
        }
        for field in &self.data {
            hasher.update(field.key.as_bytes());
            hasher.update(&[0]);
            hasher.update(field.value.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> CreateEventInput {
        CreateEventInput::new(
            IssueEventType::IssueStateChanged,
            Uuid::nil(),
            "SG-1",
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        )
        .with_field("from", "TODO")
        .with_field("to", "IN_PROGRESS")
    }

    #[test]
    fn fingerprint_is_stable_for_equal_events() {
        assert_eq!(sample().fingerprint(), sample().fingerprint());
    }

    #[test]
    fn fingerprint_ignores_message_but_not_data() {
        let base = sample();
        let reworded = sample().with_message("moved");
        assert_eq!(base.fingerprint(), reworded.fingerprint());

        let other = sample().with_field("note", "x");
        assert_ne!(base.fingerprint(), other.fingerprint());
    }

    #[test]
    fn looks_up_fields_by_key() {
        let event = sample();
        assert_eq!(event.field("to"), Some("IN_PROGRESS"));
        assert_eq!(event.field("missing"), None);
    }
}
