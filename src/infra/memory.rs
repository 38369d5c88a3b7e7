//! A tracker that lives in process memory.
//!
//! It stores issues in its own vendor vocabulary, so everything passing
//! through it is translated by the mapping configuration exactly as it would
//! be for a remote tracker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::event::{CreateEventInput, IssueEventType};
use crate::domain::issue::{
    Comment, CreateIssueInput, Issue, IssuePriority, IssueState, TShirtSizeEstimation,
};
use crate::domain::mapping::{IssueMappingConfiguration, Vocabulary};
use crate::error::{AppError, AppResult, OperationContext};
use crate::services::{Clock, ImsConnector, ImsOperation, SystemClock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMappingConfiguration {
    pub project_id: Uuid,
    pub project_key: String,
    /// Vendor status given to issues created without an explicit state.
    pub initial_status: String,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

impl IssueMappingConfiguration for MemoryMappingConfiguration {
    fn project_id(&self) -> Uuid {
        self.project_id
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Created,
    Title,
    Description,
    Status,
    Priority,
    Type,
    Sprint,
    Size,
    Assignee,
    Comment,
}

#[derive(Debug, Clone)]
struct Change {
    at: DateTime<Utc>,
    author: Option<String>,
    field: Field,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: String,
    author: Option<String>,
    body: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredIssue {
    key: String,
    project_key: String,
    summary: String,
    description: String,
    status: String,
    priority: Option<String>,
    issue_type: String,
    sprint: Option<u32>,
    size: Option<String>,
    assignee: Option<String>,
    comments: Vec<StoredComment>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    history: Vec<Change>,
}

/// Updates one vendor field, returning the change if the value moved.
fn replace<T: Clone + PartialEq + ToString>(
    slot: &mut Option<T>,
    value: T,
    field: Field,
) -> Option<(Field, Option<String>, Option<String>)> {
    if slot.as_ref() == Some(&value) {
        return None;
    }
    let from = slot.replace(value.clone()).map(|old| old.to_string());
    Some((field, from, Some(value.to_string())))
}

fn replace_text(
    slot: &mut String,
    value: &str,
    field: Field,
) -> Option<(Field, Option<String>, Option<String>)> {
    if slot == value {
        return None;
    }
    let from = std::mem::replace(slot, value.to_string());
    Some((field, Some(from), Some(value.to_string())))
}

type Changes = Vec<(Field, Option<String>, Option<String>)>;

type VendorValues = (String, String, Option<String>, Option<String>, Option<String>);

#[derive(Default)]
struct TrackerState {
    issues: Vec<StoredIssue>,
    next_number: u64,
}

impl TrackerState {
    fn issue_mut(&mut self, key: &str, project_key: &str) -> Option<&mut StoredIssue> {
        self.issues
            .iter_mut()
            .find(|issue| issue.key == key && issue.project_key == project_key)
    }

    fn issue(&self, key: &str, project_key: &str) -> Option<&StoredIssue> {
        self.issues
            .iter()
            .find(|issue| issue.key == key && issue.project_key == project_key)
    }
}

pub struct InMemoryConnector {
    clock: Arc<dyn Clock>,
    actor: Option<String>,
    online: AtomicBool,
    state: Mutex<TrackerState>,
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryConnector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            actor: None,
            online: AtomicBool::new(true),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Vendor account recorded as the author of every write.
    pub fn with_actor(mut self, account_id: impl Into<String>) -> Self {
        self.actor = Some(account_id.into());
        self
    }

    /// While offline every operation fails as unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Stores an issue as if it had been created directly in the tracker,
    /// bypassing the game vocabulary.
    pub async fn seed_issue(&self, project_key: &str, summary: &str, vendor_status: &str) -> String {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let key = Self::next_key(&mut state, project_key);
        state.issues.push(StoredIssue {
            key: key.clone(),
            project_key: project_key.to_string(),
            summary: summary.to_string(),
            description: String::new(),
            status: vendor_status.to_string(),
            priority: None,
            issue_type: "Task".to_string(),
            sprint: None,
            size: None,
            assignee: None,
            comments: Vec::new(),
            created: now,
            updated: now,
            history: vec![Change {
                at: now,
                author: None,
                field: Field::Created,
                from: None,
                to: Some(summary.to_string()),
            }],
        });
        key
    }

    fn next_key(state: &mut TrackerState, project_key: &str) -> String {
        state.next_number += 1;
        format!("{project_key}-{}", state.next_number)
    }

    fn ensure_online(&self, operation: ImsOperation, issue_id: Option<&str>) -> AppResult<()> {
        if self.online.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(AppError::TrackerUnreachable {
            operation,
            issue_id: issue_id.map(str::to_string),
            detail: "tracker is offline".to_string(),
        })
    }

    fn ensure_project(
        operation: ImsOperation,
        project_id: Uuid,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<()> {
        if project_id != config.project_id {
            return Err(AppError::Configuration(format!(
                "{operation}: project {project_id} is not mapped by this configuration (expects {})",
                config.project_id
            )));
        }
        Ok(())
    }

    /// Translates every vendor value of a new issue before anything is stored.
    fn resolve_creation(
        input: &CreateIssueInput,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<VendorValues> {
        let issue_type = config.vendor_issue_type(&input.issue_type)?.to_string();
        let status = match input.state {
            Some(state) => config.vendor_state(state)?.to_string(),
            None => config.initial_status.clone(),
        };
        let priority = input
            .priority
            .map(|priority| config.vendor_priority(priority).map(str::to_string))
            .transpose()?;
        let size = input
            .estimation
            .map(|size| config.vendor_estimation(size).map(str::to_string))
            .transpose()?;
        let assignee = input
            .assignee_id
            .map(|user| config.vendor_user(user).map(str::to_string))
            .transpose()?;
        Ok((issue_type, status, priority, size, assignee))
    }

    async fn write<F>(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        config: &MemoryMappingConfiguration,
        apply: F,
    ) -> AppResult<Issue>
    where
        F: FnOnce(&mut StoredIssue) -> Changes + Send,
    {
        self.ensure_online(operation, Some(issue_id))?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let stored = state
            .issue_mut(issue_id, &config.project_key)
            .ok_or_else(|| AppError::IssueNotFound {
                operation,
                issue_id: issue_id.to_string(),
            })?;

        // Work on a copy so a write whose result cannot be read back leaves
        // the stored issue untouched.
        let mut draft = stored.clone();
        let changes = apply(&mut draft);
        if !changes.is_empty() {
            draft.updated = now;
        }
        let change_count = changes.len();
        for (field, from, to) in changes {
            draft.history.push(Change {
                at: now,
                author: self.actor.clone(),
                field,
                from,
                to,
            });
        }
        let issue = to_issue(&draft, operation, config)?;
        *stored = draft;
        if change_count > 0 {
            tracing::debug!(%operation, issue_id, changes = change_count, "updated in-memory issue");
        }
        Ok(issue)
    }
}

fn to_issue(
    stored: &StoredIssue,
    operation: ImsOperation,
    config: &MemoryMappingConfiguration,
) -> AppResult<Issue> {
    Ok(Issue {
        id: stored.key.clone(),
        project_id: config.project_id,
        title: stored.summary.clone(),
        description: stored.description.clone(),
        state: config
            .generic_state(&stored.status)
            .within(operation, Some(&stored.key))?,
        priority: stored
            .priority
            .as_deref()
            .and_then(|name| config.generic_priority(name)),
        issue_type: config.generic_issue_type(&stored.issue_type),
        sprint_number: stored.sprint,
        estimation: stored
            .size
            .as_deref()
            .and_then(|size| config.generic_estimation(size)),
        assignee_id: stored
            .assignee
            .as_deref()
            .and_then(|account| config.generic_user(account)),
        comments: stored
            .comments
            .iter()
            .map(|comment| Comment {
                id: comment.id.clone(),
                author_id: comment
                    .author
                    .as_deref()
                    .and_then(|account| config.generic_user(account)),
                body: comment.body.clone(),
                created_at: comment.created,
            })
            .collect(),
        created_at: stored.created,
        updated_at: stored.updated,
        url: None,
    })
}

fn to_event(
    stored: &StoredIssue,
    change: &Change,
    config: &MemoryMappingConfiguration,
) -> Option<CreateEventInput> {
    let from = change.from.as_deref().unwrap_or_default();
    let to = change.to.as_deref().unwrap_or_default();
    let base = |event_type| {
        CreateEventInput::new(event_type, config.project_id, &stored.key, change.at).by(change
            .author
            .as_deref()
            .and_then(|account| config.generic_user(account)))
    };

    let event = match change.field {
        Field::Created => base(IssueEventType::IssueCreated)
            .with_message(format!("Issue {} created", stored.key))
            .with_field("title", to),
        Field::Title => base(IssueEventType::IssueTitleChanged)
            .with_message(format!("Title changed to '{to}'"))
            .with_field("from", from)
            .with_field("to", to),
        Field::Description => base(IssueEventType::IssueDescriptionChanged)
            .with_message("Description changed")
            .with_field("from", from)
            .with_field("to", to),
        Field::Status => {
            let Ok(state) = config.generic_state(to) else {
                tracing::warn!(issue = %stored.key, status = to, "skipping status with no game equivalent");
                return None;
            };
            let previous = config
                .generic_state(from)
                .map(|state| state.to_string())
                .unwrap_or_default();
            base(IssueEventType::IssueStateChanged)
                .with_message(format!("State changed to {state}"))
                .with_field("from", previous)
                .with_field("to", state.to_string())
        }
        Field::Priority => {
            let priority = config.generic_priority(to)?;
            let previous = config
                .generic_priority(from)
                .map(|priority| priority.to_string())
                .unwrap_or_default();
            base(IssueEventType::IssuePriorityChanged)
                .with_message(format!("Priority changed to {priority}"))
                .with_field("from", previous)
                .with_field("to", priority.to_string())
        }
        Field::Type => {
            let kind = config.generic_issue_type(to);
            base(IssueEventType::IssueTypeChanged)
                .with_message(format!("Type changed to {kind}"))
                .with_field("from", config.generic_issue_type(from))
                .with_field("to", kind)
        }
        Field::Sprint => base(IssueEventType::IssueSprintChanged)
            .with_message(format!("Moved to sprint {to}"))
            .with_field("to", to),
        Field::Size => {
            let size = config.generic_estimation(to)?;
            base(IssueEventType::IssueEstimationChanged)
                .with_message(format!("Estimated as {size}"))
                .with_field("to", size.to_string())
        }
        Field::Assignee => {
            let assignee = config.generic_user(to)?;
            base(IssueEventType::IssueAssigned)
                .with_message(format!("Assigned to {assignee}"))
                .with_field("assignee", assignee.to_string())
        }
        Field::Comment => base(IssueEventType::IssueCommented)
            .with_message(format!("New comment on {}", stored.key))
            .with_field("comment", to),
    };
    Some(event)
}

#[async_trait]
impl ImsConnector for InMemoryConnector {
    type Config = MemoryMappingConfiguration;

    async fn list_issues(
        &self,
        project_id: Uuid,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Vec<Issue>> {
        let operation = ImsOperation::ListIssues;
        Self::ensure_project(operation, project_id, config)?;
        self.ensure_online(operation, None)?;
        let state = self.state.lock().await;
        state
            .issues
            .iter()
            .filter(|issue| issue.project_key == config.project_key)
            .map(|issue| to_issue(issue, operation, config))
            .collect()
    }

    async fn find_issue(
        &self,
        issue_id: &str,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Option<Issue>> {
        self.ensure_online(ImsOperation::FindIssue, Some(issue_id))?;
        let state = self.state.lock().await;
        state
            .issue(issue_id, &config.project_key)
            .map(|issue| to_issue(issue, ImsOperation::FindIssue, config))
            .transpose()
    }

    async fn events_since(
        &self,
        issue_id: &str,
        since: DateTime<Utc>,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Vec<CreateEventInput>> {
        let operation = ImsOperation::EventsSince;
        self.ensure_online(operation, Some(issue_id))?;
        let state = self.state.lock().await;
        let issue = state
            .issue(issue_id, &config.project_key)
            .ok_or_else(|| AppError::IssueNotFound {
                operation,
                issue_id: issue_id.to_string(),
            })?;
        Ok(issue
            .history
            .iter()
            .filter(|change| change.at >= since)
            .filter_map(|change| to_event(issue, change, config))
            .collect())
    }

    async fn change_title(
        &self,
        issue_id: &str,
        title: &str,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::TrackerRejected {
                operation: ImsOperation::ChangeTitle,
                issue_id: Some(issue_id.to_string()),
                detail: "title must not be empty".to_string(),
            });
        }
        self.write(ImsOperation::ChangeTitle, issue_id, config, |issue| {
            replace_text(&mut issue.summary, title, Field::Title)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn change_description(
        &self,
        issue_id: &str,
        description: &str,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        self.write(ImsOperation::ChangeDescription, issue_id, config, |issue| {
            replace_text(&mut issue.description, description, Field::Description)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn change_state(
        &self,
        issue_id: &str,
        state: IssueState,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeState;
        let status = config
            .vendor_state(state)
            .within(operation, Some(issue_id))?
            .to_string();
        self.write(operation, issue_id, config, move |issue| {
            replace_text(&mut issue.status, &status, Field::Status)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn change_priority(
        &self,
        issue_id: &str,
        priority: IssuePriority,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangePriority;
        let name = config
            .vendor_priority(priority)
            .within(operation, Some(issue_id))?
            .to_string();
        self.write(operation, issue_id, config, move |issue| {
            replace(&mut issue.priority, name, Field::Priority)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn change_type(
        &self,
        issue_id: &str,
        type_name: &str,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeType;
        let name = config
            .vendor_issue_type(type_name)
            .within(operation, Some(issue_id))?
            .to_string();
        self.write(operation, issue_id, config, move |issue| {
            replace_text(&mut issue.issue_type, &name, Field::Type)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn change_sprint(
        &self,
        issue_id: &str,
        sprint_number: u32,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        self.write(ImsOperation::ChangeSprint, issue_id, config, move |issue| {
            replace(&mut issue.sprint, sprint_number, Field::Sprint)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn change_estimation(
        &self,
        issue_id: &str,
        estimation: TShirtSizeEstimation,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeEstimation;
        let size = config
            .vendor_estimation(estimation)
            .within(operation, Some(issue_id))?
            .to_string();
        self.write(operation, issue_id, config, move |issue| {
            replace(&mut issue.size, size, Field::Size)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn assign_issue(
        &self,
        issue_id: &str,
        assignee_id: Uuid,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::AssignIssue;
        let account = config
            .vendor_user(assignee_id)
            .within(operation, Some(issue_id))?
            .to_string();
        self.write(operation, issue_id, config, move |issue| {
            replace(&mut issue.assignee, account, Field::Assignee)
                .into_iter()
                .collect()
        })
        .await
    }

    async fn add_comment(
        &self,
        issue_id: &str,
        comment: &str,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::AddComment;
        if comment.trim().is_empty() {
            return Err(AppError::TrackerRejected {
                operation,
                issue_id: Some(issue_id.to_string()),
                detail: "comment must not be empty".to_string(),
            });
        }
        let now = self.clock.now();
        let author = self.actor.clone();
        self.write(operation, issue_id, config, move |issue| {
            let id = format!("{}-c{}", issue.key, issue.comments.len() + 1);
            issue.comments.push(StoredComment {
                id,
                author,
                body: comment.to_string(),
                created: now,
            });
            vec![(Field::Comment, None, Some(comment.to_string()))]
        })
        .await
    }

    async fn create_issue(
        &self,
        project_id: Uuid,
        input: CreateIssueInput,
        config: &MemoryMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::CreateIssue;
        Self::ensure_project(operation, project_id, config)?;
        if input.title.trim().is_empty() {
            return Err(AppError::TrackerRejected {
                operation,
                issue_id: None,
                detail: "title must not be empty".to_string(),
            });
        }

        let (issue_type, status, priority, size, assignee) =
            Self::resolve_creation(&input, config).within(operation, None)?;
        self.ensure_online(operation, None)?;

        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let key = Self::next_key(&mut state, &config.project_key);
        let title = input.title.trim().to_string();
        let stored = StoredIssue {
            key: key.clone(),
            project_key: config.project_key.clone(),
            summary: title.clone(),
            description: input.description,
            status,
            priority,
            issue_type,
            sprint: input.sprint_number,
            size,
            assignee,
            comments: Vec::new(),
            created: now,
            updated: now,
            history: vec![Change {
                at: now,
                author: self.actor.clone(),
                field: Field::Created,
                from: None,
                to: Some(title),
            }],
        };
        let issue = to_issue(&stored, operation, config)?;
        state.issues.push(stored);
        tracing::info!(key = %key, project = %config.project_key, "created in-memory issue");
        Ok(issue)
    }
}
