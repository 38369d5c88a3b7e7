use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::event::CreateEventInput;
use crate::domain::issue::{
    CreateIssueInput, Issue, IssuePriority, IssueState, TShirtSizeEstimation,
};
use crate::domain::mapping::IssueMappingConfiguration;
use crate::error::AppResult;

/// Names the contract operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImsOperation {
    ListIssues,
    FindIssue,
    EventsSince,
    ChangeTitle,
    ChangeDescription,
    ChangeState,
    ChangePriority,
    ChangeType,
    ChangeSprint,
    ChangeEstimation,
    AssignIssue,
    AddComment,
    CreateIssue,
}

impl ImsOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImsOperation::ListIssues => "list_issues",
            ImsOperation::FindIssue => "find_issue",
            ImsOperation::EventsSince => "events_since",
            ImsOperation::ChangeTitle => "change_title",
            ImsOperation::ChangeDescription => "change_description",
            ImsOperation::ChangeState => "change_state",
            ImsOperation::ChangePriority => "change_priority",
            ImsOperation::ChangeType => "change_type",
            ImsOperation::ChangeSprint => "change_sprint",
            ImsOperation::ChangeEstimation => "change_estimation",
            ImsOperation::AssignIssue => "assign_issue",
            ImsOperation::AddComment => "add_comment",
            ImsOperation::CreateIssue => "create_issue",
        }
    }
}

impl fmt::Display for ImsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read and write access to issues held by an external issue management
/// system.
///
/// Every call carries the mapping configuration that selects the tracker
/// project and translates the game's vocabulary. Writes return the issue as
/// the tracker reports it after the write, which may differ from what was
/// requested; callers reconcile against the returned value. Calls are
/// independent of each other and carry no cross-call atomicity.
#[async_trait]
pub trait ImsConnector: Send + Sync {
    type Config: IssueMappingConfiguration;

    async fn list_issues(&self, project_id: Uuid, config: &Self::Config) -> AppResult<Vec<Issue>>;

    /// A missing issue is `Ok(None)`, never an error.
    async fn find_issue(&self, issue_id: &str, config: &Self::Config) -> AppResult<Option<Issue>>;

    /// Changes recorded at or after `since`, oldest first.
    async fn events_since(
        &self,
        issue_id: &str,
        since: DateTime<Utc>,
        config: &Self::Config,
    ) -> AppResult<Vec<CreateEventInput>>;

    async fn change_title(
        &self,
        issue_id: &str,
        title: &str,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn change_description(
        &self,
        issue_id: &str,
        description: &str,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn change_state(
        &self,
        issue_id: &str,
        state: IssueState,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn change_priority(
        &self,
        issue_id: &str,
        priority: IssuePriority,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn change_type(
        &self,
        issue_id: &str,
        type_name: &str,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn change_sprint(
        &self,
        issue_id: &str,
        sprint_number: u32,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn change_estimation(
        &self,
        issue_id: &str,
        estimation: TShirtSizeEstimation,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn assign_issue(
        &self,
        issue_id: &str,
        assignee_id: Uuid,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    /// `comment` may contain markdown.
    async fn add_comment(
        &self,
        issue_id: &str,
        comment: &str,
        config: &Self::Config,
    ) -> AppResult<Issue>;

    async fn create_issue(
        &self,
        project_id: Uuid,
        input: CreateIssueInput,
        config: &Self::Config,
    ) -> AppResult<Issue>;
}
