use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::domain::event::{CreateEventInput, IssueEventType};
use crate::domain::issue::{
    Comment, CreateIssueInput, Issue, IssuePriority, IssueState, TShirtSizeEstimation,
};
use crate::domain::mapping::{IssueMappingConfiguration, Vocabulary};
use crate::error::{AppError, AppResult, OperationContext};
use crate::infra::adf::{AdfDocument, adf_to_text};
use crate::services::{ImsConnector, ImsOperation};

const DEFAULT_SPRINT_FIELD: &str = "customfield_10020";
const SEARCH_PAGE_SIZE: u32 = 100;
const DETAIL_PAGE_SIZE: usize = 100;

/// Mapping of one game project onto one Jira project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraMappingConfiguration {
    pub project_id: Uuid,
    pub project_key: String,
    #[serde(default = "default_sprint_field")]
    pub sprint_field: String,
    /// Single-select custom field holding the t-shirt size.
    #[serde(default)]
    pub estimation_field: Option<String>,
    /// Game sprint number to Jira sprint id.
    #[serde(default)]
    pub sprints: BTreeMap<u32, u64>,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

fn default_sprint_field() -> String {
    DEFAULT_SPRINT_FIELD.to_string()
}

impl JiraMappingConfiguration {
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mapping: Self = serde_json::from_str(&contents).map_err(|err| {
            AppError::Configuration(format!(
                "invalid mapping file {}: {err}",
                path.display()
            ))
        })?;
        if mapping.project_key.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "mapping file {} has an empty project key",
                path.display()
            )));
        }
        Ok(mapping)
    }

    fn sprint_id(&self, sprint_number: u32) -> AppResult<u64> {
        self.sprints
            .get(&sprint_number)
            .copied()
            .ok_or_else(|| AppError::unmapped("sprint number", sprint_number))
    }

    fn sprint_number(&self, sprint_id: u64) -> Option<u32> {
        self.sprints
            .iter()
            .find(|(_, id)| **id == sprint_id)
            .map(|(number, _)| *number)
    }

    fn estimation_field(&self) -> AppResult<&str> {
        self.estimation_field.as_deref().ok_or_else(|| {
            AppError::Configuration("no estimation field configured for Jira".to_string())
        })
    }

    /// Issue keys carry their project key; numeric ids are checked once the
    /// issue has been fetched.
    fn may_own(&self, issue_id: &str) -> bool {
        match issue_id.rsplit_once('-') {
            Some((project, _)) => project.eq_ignore_ascii_case(&self.project_key),
            None => true,
        }
    }

    fn requested_fields(&self) -> String {
        let mut fields = vec![
            "project",
            "summary",
            "description",
            "status",
            "priority",
            "issuetype",
            "assignee",
            "comment",
            "created",
            "updated",
            self.sprint_field.as_str(),
        ];
        if let Some(field) = &self.estimation_field {
            fields.push(field);
        }
        fields.join(",")
    }
}

impl IssueMappingConfiguration for JiraMappingConfiguration {
    fn project_id(&self) -> Uuid {
        self.project_id
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

pub struct JiraConnector {
    http: Client,
    base_url: Option<String>,
    email: Option<String>,
    token: Option<String>,
}

impl JiraConnector {
    pub fn new(base_url: Option<String>, email: Option<String>, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            email,
            token,
        }
    }

    fn api_details(&self) -> AppResult<(&str, &str, &str)> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Jira base URL not configured".to_string()))?;
        let email = self
            .email
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Jira email not configured".to_string()))?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Jira API token not configured".to_string()))?;
        Ok((base_url.trim_end_matches('/'), email, token))
    }

    fn auth_header(email: &str, token: &str) -> String {
        let credentials = format!("{email}:{token}");
        let encoded = BASE64_STANDARD.encode(credentials);
        format!("Basic {encoded}")
    }

    fn browse_url(base_url: &str, key: &str) -> String {
        format!("{}/browse/{}", base_url.trim_end_matches('/'), key)
    }

    fn request(&self, method: Method, path: &str) -> AppResult<RequestBuilder> {
        let (base_url, email, token) = self.api_details()?;
        Ok(self
            .http
            .request(method, format!("{base_url}{path}"))
            .header(AUTHORIZATION, Self::auth_header(email, token))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json"))
    }

    /// Sends the request; a 404 comes back as `None` so callers decide
    /// whether absence is an error.
    async fn execute(
        &self,
        operation: ImsOperation,
        issue_id: Option<&str>,
        request: RequestBuilder,
    ) -> AppResult<Option<Response>> {
        let response = request.send().await.map_err(|err| AppError::TrackerUnreachable {
            operation,
            issue_id: issue_id.map(str::to_string),
            detail: format!("failed to call Jira: {err}"),
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response>".to_string());
            tracing::warn!(%operation, ?issue_id, %status, "Jira rejected request");
            return Err(AppError::TrackerRejected {
                operation,
                issue_id: issue_id.map(str::to_string),
                detail: format!("Jira responded with {status}: {body}"),
            });
        }
        Ok(Some(response))
    }

    async fn send(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        request: RequestBuilder,
    ) -> AppResult<Response> {
        self.execute(operation, Some(issue_id), request)
            .await?
            .ok_or_else(|| AppError::IssueNotFound {
                operation,
                issue_id: issue_id.to_string(),
            })
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        operation: ImsOperation,
        issue_id: Option<&str>,
        response: Response,
    ) -> AppResult<T> {
        response.json::<T>().await.map_err(|err| AppError::TrackerRejected {
            operation,
            issue_id: issue_id.map(str::to_string),
            detail: format!("failed to parse Jira response: {err}"),
        })
    }

    /// Fetches an issue of the mapped project. Issues of any other project
    /// read as absent.
    async fn fetch_issue(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        config: &JiraMappingConfiguration,
        with_changelog: bool,
    ) -> AppResult<Option<JiraIssue>> {
        if !config.may_own(issue_id) {
            tracing::debug!(%operation, issue_id, project = %config.project_key, "issue key outside mapped project");
            return Ok(None);
        }

        let mut query = vec![("fields", config.requested_fields())];
        if with_changelog {
            query.push(("expand", "changelog".to_string()));
        }
        let request = self
            .request(Method::GET, &format!("/rest/api/3/issue/{issue_id}"))?
            .query(&query);

        let Some(response) = self.execute(operation, Some(issue_id), request).await? else {
            return Ok(None);
        };
        let mut issue: JiraIssue = Self::parse(operation, Some(issue_id), response).await?;
        if !issue.belongs_to(config) {
            tracing::debug!(%operation, issue_id, project = %config.project_key, "issue belongs to another project");
            return Ok(None);
        }

        if issue.fields.comment.as_ref().is_some_and(|page| !page.is_complete()) {
            let comments = self.all_comments(operation, issue_id).await?;
            issue.fields.comment = Some(JiraCommentPage::from(comments));
        }
        if with_changelog && issue.changelog.as_ref().is_none_or(|log| !log.is_complete()) {
            let histories = self.all_histories(operation, issue_id).await?;
            issue.changelog = Some(JiraChangelog::from(histories));
        }
        Ok(Some(issue))
    }

    /// Fails with `IssueNotFound` unless the issue exists in the mapped
    /// project. Runs before any write request.
    async fn require_issue(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<JiraIssue> {
        self.fetch_issue(operation, issue_id, config, false)
            .await?
            .ok_or_else(|| AppError::IssueNotFound {
                operation,
                issue_id: issue_id.to_string(),
            })
    }

    async fn all_histories(
        &self,
        operation: ImsOperation,
        issue_id: &str,
    ) -> AppResult<Vec<JiraHistory>> {
        let mut histories = Vec::new();
        loop {
            let request = self
                .request(
                    Method::GET,
                    &format!("/rest/api/3/issue/{issue_id}/changelog"),
                )?
                .query(&[
                    ("startAt", histories.len().to_string()),
                    ("maxResults", DETAIL_PAGE_SIZE.to_string()),
                ]);
            let response = self.send(operation, issue_id, request).await?;
            let page: JiraChangelogPage = Self::parse(operation, Some(issue_id), response).await?;
            let count = page.values.len();
            histories.extend(page.values);
            if count == 0 || page.is_last || page.total.is_some_and(|total| histories.len() >= total) {
                break;
            }
        }
        tracing::debug!(issue_id, count = histories.len(), "paged Jira changelog");
        Ok(histories)
    }

    async fn all_comments(
        &self,
        operation: ImsOperation,
        issue_id: &str,
    ) -> AppResult<Vec<JiraComment>> {
        let mut comments = Vec::new();
        loop {
            let request = self
                .request(
                    Method::GET,
                    &format!("/rest/api/3/issue/{issue_id}/comment"),
                )?
                .query(&[
                    ("startAt", comments.len().to_string()),
                    ("maxResults", DETAIL_PAGE_SIZE.to_string()),
                    ("orderBy", "created".to_string()),
                ]);
            let response = self.send(operation, issue_id, request).await?;
            let page: JiraCommentPage = Self::parse(operation, Some(issue_id), response).await?;
            let count = page.comments.len();
            comments.extend(page.comments);
            if count == 0 || page.total.is_none_or(|total| comments.len() >= total) {
                break;
            }
        }
        tracing::debug!(issue_id, count = comments.len(), "paged Jira comments");
        Ok(comments)
    }

    /// Re-reads the issue so writes report what the tracker actually stored.
    async fn reload(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let (base_url, _, _) = self.api_details()?;
        let issue = self.require_issue(operation, issue_id, config).await?;
        issue.into_issue(operation, config, base_url)
    }

    async fn update_fields(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        fields: Value,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        self.require_issue(operation, issue_id, config).await?;
        tracing::info!(%operation, issue_id, "updating Jira issue");
        let request = self
            .request(Method::PUT, &format!("/rest/api/3/issue/{issue_id}"))?
            .json(&json!({ "fields": fields }));
        self.send(operation, issue_id, request).await?;
        self.reload(operation, issue_id, config).await
    }

    async fn transition_to(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        target: &str,
    ) -> AppResult<()> {
        let request = self.request(
            Method::GET,
            &format!("/rest/api/3/issue/{issue_id}/transitions"),
        )?;
        let response = self.send(operation, issue_id, request).await?;
        let available: JiraTransitions = Self::parse(operation, Some(issue_id), response).await?;

        let Some(transition) = available.find_target(target) else {
            return Err(AppError::TrackerRejected {
                operation,
                issue_id: Some(issue_id.to_string()),
                detail: format!("no transition to '{target}' is available"),
            });
        };

        tracing::info!(%operation, issue_id, target, transition = %transition.id, "transitioning Jira issue");
        let request = self
            .request(
                Method::POST,
                &format!("/rest/api/3/issue/{issue_id}/transitions"),
            )?
            .json(&json!({ "transition": { "id": transition.id } }));
        self.send(operation, issue_id, request).await?;
        Ok(())
    }

    async fn move_to_sprint(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        sprint_id: u64,
    ) -> AppResult<()> {
        tracing::info!(%operation, issue_id, sprint_id, "moving Jira issue to sprint");
        let request = self
            .request(
                Method::POST,
                &format!("/rest/agile/1.0/sprint/{sprint_id}/issue"),
            )?
            .json(&json!({ "issues": [issue_id] }));
        self.send(operation, issue_id, request).await?;
        Ok(())
    }

    async fn current_status(
        &self,
        operation: ImsOperation,
        issue_id: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Option<String>> {
        let issue = self.require_issue(operation, issue_id, config).await?;
        Ok(issue.fields.status.map(|status| status.name))
    }

    fn ensure_project(
        operation: ImsOperation,
        project_id: Uuid,
        config: &JiraMappingConfiguration,
    ) -> AppResult<()> {
        if project_id != config.project_id {
            return Err(AppError::Configuration(format!(
                "{operation}: project {project_id} is not mapped by this configuration (expects {})",
                config.project_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImsConnector for JiraConnector {
    type Config = JiraMappingConfiguration;

    async fn list_issues(
        &self,
        project_id: Uuid,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Vec<Issue>> {
        let operation = ImsOperation::ListIssues;
        Self::ensure_project(operation, project_id, config)?;
        let (base_url, _, _) = self.api_details()?;

        let jql = format!("project = \"{}\" ORDER BY created ASC", config.project_key);
        let mut issues = Vec::new();
        let mut next_page: Option<String> = None;

        loop {
            let mut query = vec![
                ("jql", jql.clone()),
                ("fields", config.requested_fields()),
                ("maxResults", SEARCH_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &next_page {
                query.push(("nextPageToken", token.clone()));
            }
            let request = self
                .request(Method::GET, "/rest/api/3/search/jql")?
                .query(&query);
            let response = self.execute(operation, None, request).await?.ok_or_else(|| {
                AppError::Configuration(format!(
                    "Jira search endpoint not found at {base_url}"
                ))
            })?;
            let page: JiraSearchPage = Self::parse(operation, None, response).await?;

            for issue in page.issues {
                issues.push(issue.into_issue(operation, config, base_url)?);
            }

            match page.next_page_token {
                Some(token) if !page.is_last => next_page = Some(token),
                _ => break,
            }
        }

        tracing::debug!(project = %config.project_key, count = issues.len(), "listed Jira issues");
        Ok(issues)
    }

    async fn find_issue(
        &self,
        issue_id: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Option<Issue>> {
        let operation = ImsOperation::FindIssue;
        let (base_url, _, _) = self.api_details()?;
        match self.fetch_issue(operation, issue_id, config, false).await? {
            Some(issue) => issue.into_issue(operation, config, base_url).map(Some),
            None => Ok(None),
        }
    }

    async fn events_since(
        &self,
        issue_id: &str,
        since: DateTime<Utc>,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Vec<CreateEventInput>> {
        let operation = ImsOperation::EventsSince;
        let issue = self
            .fetch_issue(operation, issue_id, config, true)
            .await?
            .ok_or_else(|| AppError::IssueNotFound {
                operation,
                issue_id: issue_id.to_string(),
            })?;
        issue.events_since(since, config)
    }

    async fn change_title(
        &self,
        issue_id: &str,
        title: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::TrackerRejected {
                operation: ImsOperation::ChangeTitle,
                issue_id: Some(issue_id.to_string()),
                detail: "title must not be empty".to_string(),
            });
        }
        self.update_fields(
            ImsOperation::ChangeTitle,
            issue_id,
            json!({ "summary": title }),
            config,
        )
        .await
    }

    async fn change_description(
        &self,
        issue_id: &str,
        description: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        self.update_fields(
            ImsOperation::ChangeDescription,
            issue_id,
            json!({ "description": AdfDocument::from_markdown(description) }),
            config,
        )
        .await
    }

    async fn change_state(
        &self,
        issue_id: &str,
        state: IssueState,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeState;
        let target = config
            .vendor_state(state)
            .within(operation, Some(issue_id))?;

        let current = self.current_status(operation, issue_id, config).await?;
        if current.is_some_and(|name| name.eq_ignore_ascii_case(target)) {
            tracing::debug!(issue_id, target, "Jira issue already in requested state");
        } else {
            self.transition_to(operation, issue_id, target).await?;
        }
        self.reload(operation, issue_id, config).await
    }

    async fn change_priority(
        &self,
        issue_id: &str,
        priority: IssuePriority,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangePriority;
        let name = config
            .vendor_priority(priority)
            .within(operation, Some(issue_id))?;
        self.update_fields(
            operation,
            issue_id,
            json!({ "priority": { "name": name } }),
            config,
        )
        .await
    }

    async fn change_type(
        &self,
        issue_id: &str,
        type_name: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeType;
        let name = config
            .vendor_issue_type(type_name)
            .within(operation, Some(issue_id))?;
        self.update_fields(
            operation,
            issue_id,
            json!({ "issuetype": { "name": name } }),
            config,
        )
        .await
    }

    async fn change_sprint(
        &self,
        issue_id: &str,
        sprint_number: u32,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeSprint;
        let sprint_id = config
            .sprint_id(sprint_number)
            .within(operation, Some(issue_id))?;
        self.require_issue(operation, issue_id, config).await?;
        self.move_to_sprint(operation, issue_id, sprint_id).await?;
        self.reload(operation, issue_id, config).await
    }

    async fn change_estimation(
        &self,
        issue_id: &str,
        estimation: TShirtSizeEstimation,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::ChangeEstimation;
        let value = config
            .vendor_estimation(estimation)
            .within(operation, Some(issue_id))?;
        let field = config.estimation_field()?;
        let mut fields = Map::new();
        fields.insert(field.to_string(), json!({ "value": value }));
        self.update_fields(
            operation,
            issue_id,
            Value::Object(fields),
            config,
        )
        .await
    }

    async fn assign_issue(
        &self,
        issue_id: &str,
        assignee_id: Uuid,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::AssignIssue;
        let account_id = config
            .vendor_user(assignee_id)
            .within(operation, Some(issue_id))?;
        self.require_issue(operation, issue_id, config).await?;
        tracing::info!(%operation, issue_id, account_id, "assigning Jira issue");
        let request = self
            .request(
                Method::PUT,
                &format!("/rest/api/3/issue/{issue_id}/assignee"),
            )?
            .json(&json!({ "accountId": account_id }));
        self.send(operation, issue_id, request).await?;
        self.reload(operation, issue_id, config).await
    }

    async fn add_comment(
        &self,
        issue_id: &str,
        comment: &str,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Issue> {
        let operation = ImsOperation::AddComment;
        if comment.trim().is_empty() {
            return Err(AppError::TrackerRejected {
                operation,
                issue_id: Some(issue_id.to_string()),
                detail: "comment must not be empty".to_string(),
            });
        }
        self.require_issue(operation, issue_id, config).await?;
        tracing::info!(%operation, issue_id, "commenting on Jira issue");
        let request = self
            .request(
                Method::POST,
                &format!("/rest/api/3/issue/{issue_id}/comment"),
            )?
            .json(&json!({ "body": AdfDocument::from_markdown(comment) }));
        self.send(operation, issue_id, request).await?;
        self.reload(operation, issue_id, config).await
    }

    async fn create_issue(
        &self,
        project_id: Uuid,
        input: CreateIssueInput,
        config: &JiraMappingConfiguration,
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

        // Resolve every value up front so an unmapped one fails before
        // anything is created.
        let request_body = JiraCreateIssueRequest::new(&input, config).within(operation, None)?;
        let target_state = input
            .state
            .map(|state| config.vendor_state(state))
            .transpose()
            .within(operation, None)?;
        let sprint_id = input
            .sprint_number
            .map(|number| config.sprint_id(number))
            .transpose()
            .within(operation, None)?;

        let request = self
            .request(Method::POST, "/rest/api/3/issue")?
            .json(&request_body);
        let response = self.execute(operation, None, request).await?.ok_or_else(|| {
            AppError::TrackerRejected {
                operation,
                issue_id: None,
                detail: format!("Jira project {} not found", config.project_key),
            }
        })?;
        let created: JiraCreateIssueResponse = Self::parse(operation, None, response).await?;
        tracing::info!(key = %created.key, project = %config.project_key, "created Jira issue");

        if let Some(target) = target_state {
            let current = self.current_status(operation, &created.key, config).await?;
            if !current.is_some_and(|name| name.eq_ignore_ascii_case(target)) {
                self.transition_to(operation, &created.key, target).await?;
            }
        }
        if let Some(sprint_id) = sprint_id {
            self.move_to_sprint(operation, &created.key, sprint_id)
                .await?;
        }

        self.reload(operation, &created.key, config).await
    }
}

#[derive(Serialize)]
struct JiraCreateIssueRequest {
    fields: JiraCreateIssueFields,
}

impl JiraCreateIssueRequest {
    fn new(input: &CreateIssueInput, config: &JiraMappingConfiguration) -> AppResult<Self> {
        let issuetype = JiraIssueType {
            name: config.vendor_issue_type(&input.issue_type)?.to_string(),
        };
        let priority = input
            .priority
            .map(|priority| config.vendor_priority(priority))
            .transpose()?
            .map(|name| JiraNamedRef {
                name: name.to_string(),
            });
        let assignee = input
            .assignee_id
            .map(|user| config.vendor_user(user))
            .transpose()?
            .map(|account_id| JiraAccountRef {
                account_id: account_id.to_string(),
            });

        let mut custom = Map::new();
        if let Some(estimation) = input.estimation {
            let value = config.vendor_estimation(estimation)?;
            custom.insert(
                config.estimation_field()?.to_string(),
                json!({ "value": value }),
            );
        }

        Ok(Self {
            fields: JiraCreateIssueFields {
                project: JiraProject {
                    key: config.project_key.clone(),
                },
                summary: input.title.trim().to_string(),
                description: AdfDocument::from_markdown(&input.description),
                issuetype,
                priority,
                assignee,
                custom,
            },
        })
    }
}

#[derive(Serialize)]
struct JiraCreateIssueFields {
    project: JiraProject,
    summary: String,
    description: AdfDocument,
    issuetype: JiraIssueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<JiraNamedRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignee: Option<JiraAccountRef>,
    #[serde(flatten)]
    custom: Map<String, Value>,
}

#[derive(Serialize)]
struct JiraProject {
    key: String,
}

#[derive(Serialize)]
struct JiraIssueType {
    name: String,
}

#[derive(Serialize)]
struct JiraNamedRef {
    name: String,
}

#[derive(Serialize)]
struct JiraAccountRef {
    #[serde(rename = "accountId")]
    account_id: String,
}

#[derive(Deserialize)]
struct JiraCreateIssueResponse {
    key: String,
}

#[derive(Deserialize)]
struct JiraSearchPage {
    #[serde(default)]
    issues: Vec<JiraIssue>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
    #[serde(rename = "isLast", default = "default_true")]
    is_last: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct JiraTransitions {
    transitions: Vec<JiraTransition>,
}

impl JiraTransitions {
    fn find_target(&self, target: &str) -> Option<&JiraTransition> {
        self.transitions
            .iter()
            .find(|transition| transition.to.name.eq_ignore_ascii_case(target))
    }
}

#[derive(Deserialize)]
struct JiraTransition {
    id: String,
    to: JiraNamed,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    fields: JiraFields,
    #[serde(default)]
    changelog: Option<JiraChangelog>,
}

#[derive(Deserialize)]
struct JiraFields {
    #[serde(default)]
    project: Option<JiraProjectRef>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<Value>,
    #[serde(default)]
    status: Option<JiraNamed>,
    #[serde(default)]
    priority: Option<JiraNamed>,
    #[serde(default)]
    issuetype: Option<JiraNamed>,
    #[serde(default)]
    assignee: Option<JiraUser>,
    #[serde(default)]
    comment: Option<JiraCommentPage>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(flatten)]
    custom: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct JiraNamed {
    name: String,
}

#[derive(Deserialize)]
struct JiraProjectRef {
    key: String,
}

#[derive(Deserialize)]
struct JiraUser {
    #[serde(rename = "accountId")]
    account_id: String,
}

/// Comments embedded in an issue, or one page of the comment endpoint.
#[derive(Deserialize)]
struct JiraCommentPage {
    #[serde(default)]
    comments: Vec<JiraComment>,
    #[serde(default)]
    total: Option<usize>,
}

impl JiraCommentPage {
    fn is_complete(&self) -> bool {
        self.total.is_none_or(|total| self.comments.len() >= total)
    }
}

impl From<Vec<JiraComment>> for JiraCommentPage {
    fn from(comments: Vec<JiraComment>) -> Self {
        Self {
            total: Some(comments.len()),
            comments,
        }
    }
}

#[derive(Deserialize)]
struct JiraComment {
    id: String,
    #[serde(default)]
    author: Option<JiraUser>,
    #[serde(default)]
    body: Value,
    created: String,
}

#[derive(Deserialize)]
struct JiraChangelog {
    #[serde(default)]
    histories: Vec<JiraHistory>,
    #[serde(default)]
    total: Option<usize>,
}

impl JiraChangelog {
    /// `expand=changelog` returns at most one page of histories.
    fn is_complete(&self) -> bool {
        self.total.is_none_or(|total| self.histories.len() >= total)
    }
}

impl From<Vec<JiraHistory>> for JiraChangelog {
    fn from(histories: Vec<JiraHistory>) -> Self {
        Self {
            total: Some(histories.len()),
            histories,
        }
    }
}

#[derive(Deserialize)]
struct JiraChangelogPage {
    #[serde(default)]
    values: Vec<JiraHistory>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(rename = "isLast", default)]
    is_last: bool,
}

#[derive(Deserialize)]
struct JiraHistory {
    #[serde(default)]
    author: Option<JiraUser>,
    created: String,
    #[serde(default)]
    items: Vec<JiraChangeItem>,
}

#[derive(Deserialize)]
struct JiraChangeItem {
    field: String,
    #[serde(rename = "fieldId", default)]
    field_id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(rename = "fromString", default)]
    from_text: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(rename = "toString", default)]
    to_text: Option<String>,
}

impl JiraChangeItem {
    fn is_field(&self, name: &str) -> bool {
        self.field_id.as_deref() == Some(name) || self.field.eq_ignore_ascii_case(name)
    }
}

/// Accepts Jira's `+0000` offsets as well as RFC 3339.
fn parse_jira_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

impl JiraIssue {
    fn belongs_to(&self, config: &JiraMappingConfiguration) -> bool {
        match &self.fields.project {
            Some(project) => project.key.eq_ignore_ascii_case(&config.project_key),
            None => config.may_own(&self.key),
        }
    }

    /// Value a field had when the issue was created: the `fromString` of its
    /// first recorded change, else its current value.
    fn original_text(&self, field: &str, current: Option<&str>) -> String {
        let mut histories: Vec<&JiraHistory> = self
            .changelog
            .iter()
            .flat_map(|changelog| changelog.histories.iter())
            .collect();
        histories.sort_by_key(|history| parse_jira_timestamp(&history.created));
        histories
            .iter()
            .flat_map(|history| history.items.iter())
            .find(|item| item.is_field(field))
            .map(|item| item.from_text.clone().unwrap_or_default())
            .or_else(|| current.map(str::to_string))
            .unwrap_or_default()
    }

    fn malformed(&self, operation: ImsOperation, detail: String) -> AppError {
        AppError::TrackerRejected {
            operation,
            issue_id: Some(self.key.clone()),
            detail,
        }
    }

    fn timestamp(
        &self,
        operation: ImsOperation,
        field: &str,
        value: Option<&str>,
    ) -> AppResult<DateTime<Utc>> {
        value
            .and_then(parse_jira_timestamp)
            .ok_or_else(|| self.malformed(operation, format!("missing or invalid '{field}' timestamp")))
    }

    fn sprint_number(&self, config: &JiraMappingConfiguration) -> Option<u32> {
        let sprints = self.fields.custom.get(&config.sprint_field)?.as_array()?;
        let current = sprints
            .iter()
            .rev()
            .find(|sprint| sprint.get("state").and_then(Value::as_str) != Some("closed"))
            .or_else(|| sprints.last())?;
        let sprint_id = current.get("id").and_then(Value::as_u64)?;
        let number = config.sprint_number(sprint_id);
        if number.is_none() {
            tracing::warn!(issue = %self.key, sprint_id, "Jira sprint has no game sprint number");
        }
        number
    }

    fn estimation(&self, config: &JiraMappingConfiguration) -> Option<TShirtSizeEstimation> {
        let field = config.estimation_field.as_deref()?;
        let raw = self.fields.custom.get(field)?;
        let value = raw
            .get("value")
            .and_then(Value::as_str)
            .or_else(|| raw.as_str())?;
        let estimation = config.generic_estimation(value);
        if estimation.is_none() {
            tracing::warn!(issue = %self.key, value, "Jira estimation has no game equivalent");
        }
        estimation
    }

    fn user(&self, config: &JiraMappingConfiguration, user: Option<&JiraUser>) -> Option<Uuid> {
        let account_id = &user?.account_id;
        let mapped = config.generic_user(account_id);
        if mapped.is_none() {
            tracing::warn!(issue = %self.key, account_id = %account_id, "Jira account has no game user");
        }
        mapped
    }

    fn into_issue(
        self,
        operation: ImsOperation,
        config: &JiraMappingConfiguration,
        base_url: &str,
    ) -> AppResult<Issue> {
        let status = self
            .fields
            .status
            .as_ref()
            .map(|status| status.name.as_str())
            .ok_or_else(|| self.malformed(operation, "issue has no status".to_string()))?;
        let state = config
            .generic_state(status)
            .within(operation, Some(&self.key))?;

        let priority = self.fields.priority.as_ref().and_then(|priority| {
            let mapped = config.generic_priority(&priority.name);
            if mapped.is_none() {
                tracing::warn!(issue = %self.key, priority = %priority.name, "Jira priority has no game equivalent");
            }
            mapped
        });

        let created_at = self.timestamp(operation, "created", self.fields.created.as_deref())?;
        let updated_at = self
            .fields
            .updated
            .as_deref()
            .and_then(parse_jira_timestamp)
            .unwrap_or(created_at);

        let mut comments = Vec::new();
        if let Some(page) = &self.fields.comment {
            for comment in &page.comments {
                comments.push(Comment {
                    id: comment.id.clone(),
                    author_id: self.user(config, comment.author.as_ref()),
                    body: adf_to_text(&comment.body),
                    created_at: self.timestamp(operation, "comment.created", Some(comment.created.as_str()))?,
                });
            }
        }

        Ok(Issue {
            id: self.key.clone(),
            project_id: config.project_id,
            title: self.fields.summary.clone().unwrap_or_default(),
            description: self
                .fields
                .description
                .as_ref()
                .map(adf_to_text)
                .unwrap_or_default(),
            state,
            priority,
            issue_type: self
                .fields
                .issuetype
                .as_ref()
                .map(|kind| config.generic_issue_type(&kind.name))
                .unwrap_or_default(),
            sprint_number: self.sprint_number(config),
            estimation: self.estimation(config),
            assignee_id: self.user(config, self.fields.assignee.as_ref()),
            comments,
            created_at,
            updated_at,
            url: Some(JiraConnector::browse_url(base_url, &self.key)),
        })
    }

    /// Converts the changelog and comments into game events at or after
    /// `since`, oldest first.
    fn events_since(
        &self,
        since: DateTime<Utc>,
        config: &JiraMappingConfiguration,
    ) -> AppResult<Vec<CreateEventInput>> {
        let operation = ImsOperation::EventsSince;
        let project_id = config.project_id;
        let mut events = Vec::new();

        let created_at = self.timestamp(operation, "created", self.fields.created.as_deref())?;
        if created_at >= since {
            // Creation-time values keep the event identical across later edits.
            let title = self.original_text("summary", self.fields.summary.as_deref());
            let vendor_type = self.original_text(
                "issuetype",
                self.fields.issuetype.as_ref().map(|kind| kind.name.as_str()),
            );
            events.push(
                CreateEventInput::new(IssueEventType::IssueCreated, project_id, &self.key, created_at)
                    .with_message(format!("Issue {} created", self.key))
                    .with_field("title", title)
                    .with_field("type", config.generic_issue_type(&vendor_type)),
            );
        }

        let histories = self
            .changelog
            .as_ref()
            .map(|changelog| changelog.histories.as_slice())
            .unwrap_or_default();
        for history in histories {
            let timestamp = self.timestamp(operation, "history.created", Some(history.created.as_str()))?;
            if timestamp < since {
                continue;
            }
            let author = self.user(config, history.author.as_ref());
            for item in &history.items {
                if let Some(event) = self.change_event(item, timestamp, config) {
                    events.push(event.by(author));
                }
            }
        }

        if let Some(page) = &self.fields.comment {
            for comment in &page.comments {
                let timestamp = self.timestamp(operation, "comment.created", Some(comment.created.as_str()))?;
                if timestamp < since {
                    continue;
                }
                events.push(
                    CreateEventInput::new(IssueEventType::IssueCommented, project_id, &self.key, timestamp)
                        .by(self.user(config, comment.author.as_ref()))
                        .with_message(format!("New comment on {}", self.key))
                        .with_field("comment_id", comment.id.clone())
                        .with_field("comment", adf_to_text(&comment.body)),
                );
            }
        }

        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }

    fn change_event(
        &self,
        item: &JiraChangeItem,
        timestamp: DateTime<Utc>,
        config: &JiraMappingConfiguration,
    ) -> Option<CreateEventInput> {
        let from_text = item.from_text.clone().unwrap_or_default();
        let to_text = item.to_text.clone().unwrap_or_default();
        let event = |event_type| CreateEventInput::new(event_type, config.project_id, &self.key, timestamp);

        if item.is_field("summary") {
            return Some(
                event(IssueEventType::IssueTitleChanged)
                    .with_message(format!("Title changed to '{to_text}'"))
                    .with_field("from", from_text)
                    .with_field("to", to_text),
            );
        }
        if item.is_field("description") {
            return Some(
                event(IssueEventType::IssueDescriptionChanged)
                    .with_message("Description changed")
                    .with_field("from", from_text)
                    .with_field("to", to_text),
            );
        }
        if item.is_field("status") {
            let to = self.translated(config.generic_state(&to_text).ok(), "state", &to_text)?;
            let from = config
                .generic_state(&from_text)
                .map(|state| state.to_string())
                .unwrap_or_default();
            return Some(
                event(IssueEventType::IssueStateChanged)
                    .with_message(format!("State changed to {to}"))
                    .with_field("from", from)
                    .with_field("to", to.to_string()),
            );
        }
        if item.is_field("priority") {
            let to = self.translated(config.generic_priority(&to_text), "priority", &to_text)?;
            let from = config
                .generic_priority(&from_text)
                .map(|priority| priority.to_string())
                .unwrap_or_default();
            return Some(
                event(IssueEventType::IssuePriorityChanged)
                    .with_message(format!("Priority changed to {to}"))
                    .with_field("from", from)
                    .with_field("to", to.to_string()),
            );
        }
        if item.is_field("issuetype") {
            let to = config.generic_issue_type(&to_text);
            return Some(
                event(IssueEventType::IssueTypeChanged)
                    .with_message(format!("Type changed to {to}"))
                    .with_field("from", config.generic_issue_type(&from_text))
                    .with_field("to", to),
            );
        }
        if item.is_field(&config.sprint_field) || item.field.eq_ignore_ascii_case("sprint") {
            let sprint_id = item
                .to
                .as_deref()
                .and_then(|ids| ids.split(',').next_back())
                .and_then(|id| id.trim().parse::<u64>().ok());
            let number = sprint_id.and_then(|id| config.sprint_number(id));
            let to = self.translated(number, "sprint", &to_text)?;
            return Some(
                event(IssueEventType::IssueSprintChanged)
                    .with_message(format!("Moved to sprint {to}"))
                    .with_field("to", to.to_string()),
            );
        }
        if config
            .estimation_field
            .as_deref()
            .is_some_and(|field| item.is_field(field))
        {
            let to = self.translated(config.generic_estimation(&to_text), "estimation", &to_text)?;
            return Some(
                event(IssueEventType::IssueEstimationChanged)
                    .with_message(format!("Estimated as {to}"))
                    .with_field("to", to.to_string()),
            );
        }
        if item.is_field("assignee") {
            let assignee = match item.to.as_deref() {
                Some(account_id) => {
                    let user = config.generic_user(account_id);
                    self.translated(user, "assignee", account_id)?.to_string()
                }
                None => String::new(),
            };
            let message = if assignee.is_empty() {
                "Issue unassigned".to_string()
            } else {
                format!("Assigned to {assignee}")
            };
            return Some(
                event(IssueEventType::IssueAssigned)
                    .with_message(message)
                    .with_field("assignee", assignee),
            );
        }
        None
    }

    fn translated<T>(&self, value: Option<T>, kind: &str, vendor: &str) -> Option<T> {
        if value.is_none() {
            tracing::warn!(issue = %self.key, kind, vendor, "skipping Jira change with no game equivalent");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::mapping::VocabularyMap;

    fn config() -> JiraMappingConfiguration {
        JiraMappingConfiguration {
            project_id: Uuid::from_u128(7),
            project_key: "SG".to_string(),
            sprint_field: DEFAULT_SPRINT_FIELD.to_string(),
            estimation_field: Some("customfield_10050".to_string()),
            sprints: BTreeMap::from([(1, 101), (2, 102)]),
            vocabulary: Vocabulary {
                states: VocabularyMap::new()
                    .with(IssueState::Todo, "To Do")
                    .with(IssueState::InProgress, "In Progress")
                    .with(IssueState::Done, "Done"),
                priorities: VocabularyMap::new()
                    .with(IssuePriority::Medium, "Medium")
                    .with(IssuePriority::High, "High"),
                estimations: VocabularyMap::new()
                    .with(TShirtSizeEstimation::S, "Small")
                    .with(TShirtSizeEstimation::M, "Medium"),
                issue_types: VocabularyMap::new()
                    .with("Story".to_string(), "Story")
                    .with("Bug".to_string(), "Bug"),
                users: VocabularyMap::new().with(Uuid::from_u128(42), "acc-42"),
            },
        }
    }

    fn issue_json() -> Value {
        json!({
            "id": "10001",
            "key": "SG-1",
            "fields": {
                "summary": "Login page",
                "description": {"type": "doc", "version": 1, "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "Build it"}]}
                ]},
                "status": {"name": "In Progress"},
                "priority": {"name": "High"},
                "issuetype": {"name": "Story"},
                "assignee": {"accountId": "acc-42"},
                "created": "2024-03-01T09:00:00.000+0000",
                "updated": "2024-03-02T10:00:00.000+0000",
                "customfield_10020": [
                    {"id": 101, "state": "closed"},
                    {"id": 102, "state": "active"}
                ],
                "customfield_10050": {"value": "Medium"},
                "comment": {"comments": [
                    {"id": "c1", "author": {"accountId": "acc-42"},
                     "body": {"type": "doc", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "Looks good"}]}
                     ]},
                     "created": "2024-03-02T08:00:00.000+0000"}
                ]}
            },
            "changelog": {"histories": [
                {"author": {"accountId": "acc-42"}, "created": "2024-03-01T12:00:00.000+0000",
                 "items": [
                    {"field": "status", "fieldId": "status", "fromString": "To Do", "toString": "In Progress"},
                    {"field": "labels", "fromString": "", "toString": "ui"}
                 ]},
                {"author": {"accountId": "acc-unknown"}, "created": "2024-03-02T09:00:00.000+0000",
                 "items": [
                    {"field": "Sprint", "fieldId": "customfield_10020", "from": "101", "to": "101, 102"},
                    {"field": "Estimation", "fieldId": "customfield_10050", "toString": "Medium"},
                    {"field": "status", "fieldId": "status", "fromString": "In Progress", "toString": "Blocked"}
                 ]}
            ]}
        })
    }

    fn parsed() -> JiraIssue {
        serde_json::from_value(issue_json()).unwrap()
    }

    #[test]
    fn converts_jira_issue_to_game_issue() {
        let issue = parsed()
            .into_issue(ImsOperation::FindIssue, &config(), "https://acme.atlassian.net/")
            .unwrap();

        assert_eq!(issue.id, "SG-1");
        assert_eq!(issue.project_id, Uuid::from_u128(7));
        assert_eq!(issue.title, "Login page");
        assert_eq!(issue.description, "Build it");
        assert_eq!(issue.state, IssueState::InProgress);
        assert_eq!(issue.priority, Some(IssuePriority::High));
        assert_eq!(issue.issue_type, "Story");
        assert_eq!(issue.sprint_number, Some(2));
        assert_eq!(issue.estimation, Some(TShirtSizeEstimation::M));
        assert_eq!(issue.assignee_id, Some(Uuid::from_u128(42)));
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.comments[0].body, "Looks good");
        assert_eq!(
            issue.created_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(
            issue.url.as_deref(),
            Some("https://acme.atlassian.net/browse/SG-1")
        );
    }

    #[test]
    fn unmapped_status_fails_conversion() {
        let mut raw = issue_json();
        raw["fields"]["status"] = json!({"name": "Blocked"});
        let issue: JiraIssue = serde_json::from_value(raw).unwrap();
        let err = issue
            .into_issue(ImsOperation::FindIssue, &config(), "https://acme.atlassian.net")
            .unwrap_err();
        assert!(matches!(err, AppError::UnmappedValue { kind: "tracker state", .. }));
    }

    #[test]
    fn unknown_priority_reads_as_absent() {
        let mut raw = issue_json();
        raw["fields"]["priority"] = json!({"name": "Trivial"});
        let issue: JiraIssue = serde_json::from_value(raw).unwrap();
        let issue = issue
            .into_issue(ImsOperation::FindIssue, &config(), "https://acme.atlassian.net")
            .unwrap();
        assert_eq!(issue.priority, None);
    }

    #[test]
    fn changelog_becomes_translated_events() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let events = parsed().events_since(since, &config()).unwrap();

        let types: Vec<_> = events.iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec![
                IssueEventType::IssueCreated,
                IssueEventType::IssueStateChanged,
                IssueEventType::IssueCommented,
                IssueEventType::IssueSprintChanged,
                IssueEventType::IssueEstimationChanged,
            ]
        );

        let state_change = &events[1];
        assert_eq!(state_change.field("from"), Some("TODO"));
        assert_eq!(state_change.field("to"), Some("IN_PROGRESS"));
        assert_eq!(state_change.user_id, Some(Uuid::from_u128(42)));

        assert_eq!(events[3].field("to"), Some("2"));
        assert_eq!(events[3].user_id, None);
        assert_eq!(events[4].field("to"), Some("M"));
    }

    #[test]
    fn since_bound_is_inclusive() {
        let since = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let events = parsed().events_since(since, &config()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.timestamp >= since));
    }

    #[test]
    fn since_after_last_change_is_empty() {
        let since = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        assert!(parsed().events_since(since, &config()).unwrap().is_empty());
    }

    #[test]
    fn create_request_carries_mapped_fields() {
        let mut input = CreateIssueInput::new("New feature", "story");
        input.description = "Details".to_string();
        input.priority = Some(IssuePriority::Medium);
        input.estimation = Some(TShirtSizeEstimation::S);
        input.assignee_id = Some(Uuid::from_u128(42));

        let body = serde_json::to_value(JiraCreateIssueRequest::new(&input, &config()).unwrap())
            .unwrap();
        let fields = &body["fields"];
        assert_eq!(fields["project"]["key"], "SG");
        assert_eq!(fields["summary"], "New feature");
        assert_eq!(fields["issuetype"]["name"], "Story");
        assert_eq!(fields["priority"]["name"], "Medium");
        assert_eq!(fields["assignee"]["accountId"], "acc-42");
        assert_eq!(fields["customfield_10050"]["value"], "Small");
        assert_eq!(fields["description"]["type"], "doc");
    }

    #[test]
    fn create_request_rejects_unmapped_values() {
        let mut input = CreateIssueInput::new("New feature", "Story");
        input.estimation = Some(TShirtSizeEstimation::Xxl);
        let err = JiraCreateIssueRequest::new(&input, &config())
            .err()
            .unwrap();
        assert!(matches!(err, AppError::UnmappedValue { kind: "estimation", .. }));

        let input = CreateIssueInput::new("New feature", "Epic");
        assert!(JiraCreateIssueRequest::new(&input, &config()).is_err());
    }

    #[test]
    fn create_request_omits_unset_optionals() {
        let input = CreateIssueInput::new("Bare", "Bug");
        let body = serde_json::to_value(JiraCreateIssueRequest::new(&input, &config()).unwrap())
            .unwrap();
        let fields = body["fields"].as_object().unwrap();
        assert!(!fields.contains_key("priority"));
        assert!(!fields.contains_key("assignee"));
        assert!(!fields.contains_key("customfield_10050"));
    }

    #[test]
    fn finds_transition_by_target_status() {
        let transitions: JiraTransitions = serde_json::from_value(json!({
            "transitions": [
                {"id": "11", "name": "Start", "to": {"name": "In Progress"}},
                {"id": "31", "name": "Finish", "to": {"name": "Done"}}
            ]
        }))
        .unwrap();
        assert_eq!(transitions.find_target("done").map(|t| t.id.as_str()), Some("31"));
        assert!(transitions.find_target("In Review").is_none());
    }

    #[test]
    fn parses_jira_and_rfc3339_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            parse_jira_timestamp("2024-03-01T09:00:00.000+0100"),
            Some(expected)
        );
        assert_eq!(parse_jira_timestamp("2024-03-01T08:00:00Z"), Some(expected));
        assert_eq!(parse_jira_timestamp("yesterday"), None);
    }

    #[test]
    fn loads_mapping_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        fs::write(
            &path,
            r#"{
                "project_id": "00000000-0000-0000-0000-000000000007",
                "project_key": "SG",
                "sprints": {"3": 103},
                "vocabulary": {"states": {"DONE": "Done"}}
            }"#,
        )
        .unwrap();

        let mapping = JiraMappingConfiguration::load(&path).unwrap();
        assert_eq!(mapping.sprint_field, DEFAULT_SPRINT_FIELD);
        assert_eq!(mapping.sprint_id(3).unwrap(), 103);
        assert_eq!(mapping.sprint_number(103), Some(3));
        assert!(mapping.sprint_id(4).is_err());
        assert!(mapping.estimation_field().is_err());
    }

    #[test]
    fn mapping_file_with_shared_tracker_names_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        fs::write(
            &path,
            r#"{
                "project_id": "00000000-0000-0000-0000-000000000007",
                "project_key": "SG",
                "vocabulary": {"states": {"BACKLOG": "Open", "TODO": "open"}}
            }"#,
        )
        .unwrap();

        let err = JiraMappingConfiguration::load(&path).unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref message) if message.contains("both map to")));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let connector = JiraConnector::new(Some("https://acme.atlassian.net".to_string()), None, None);
        let err = connector.find_issue("SG-1", &config()).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn unmapped_state_fails_before_any_request() {
        let connector = JiraConnector::new(
            Some("http://127.0.0.1:9".to_string()),
            Some("dev@example.com".to_string()),
            Some("token".to_string()),
        );
        let err = connector
            .change_state("SG-1", IssueState::InReview, &config())
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            AppError::UnmappedValue {
                operation: Some(ImsOperation::ChangeState),
                issue_id: Some(id),
                kind: "issue state",
                ..
            } if id == "SG-1"
        ));
    }

    fn offline_connector() -> JiraConnector {
        JiraConnector::new(
            Some("http://127.0.0.1:9".to_string()),
            Some("dev@example.com".to_string()),
            Some("token".to_string()),
        )
    }

    #[tokio::test]
    async fn keys_of_other_projects_resolve_to_nothing() {
        let connector = offline_connector();
        let config = config();

        assert_eq!(connector.find_issue("OTHER-7", &config).await.unwrap(), None);

        let err = connector
            .change_title("OTHER-7", "Hijacked", &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::IssueNotFound { operation: ImsOperation::ChangeTitle, .. }
        ));

        let err = connector
            .events_since("OTHER-7", DateTime::<Utc>::UNIX_EPOCH, &config)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn project_field_decides_ownership() {
        let config = config();
        assert!(parsed().belongs_to(&config));

        let mut raw = issue_json();
        raw["fields"]["project"] = json!({"key": "OTHER"});
        let foreign: JiraIssue = serde_json::from_value(raw).unwrap();
        assert!(!foreign.belongs_to(&config));

        let mut raw = issue_json();
        raw["key"] = json!("OTHER-7");
        let by_key: JiraIssue = serde_json::from_value(raw).unwrap();
        assert!(!by_key.belongs_to(&config));

        assert!(config.may_own("sg-12"));
        assert!(config.may_own("10001"));
        assert!(!config.may_own("SGX-1"));
    }

    #[test]
    fn created_event_is_stable_across_later_edits() {
        let config = config();
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let first = parsed().events_since(epoch, &config).unwrap();

        let mut raw = issue_json();
        raw["fields"]["summary"] = json!("Login page v2");
        raw["fields"]["issuetype"] = json!({"name": "Bug"});
        raw["changelog"]["histories"]
            .as_array_mut()
            .unwrap()
            .push(json!({
                "author": {"accountId": "acc-42"}, "created": "2024-03-03T09:00:00.000+0000",
                "items": [
                    {"field": "summary", "fieldId": "summary", "fromString": "Login page", "toString": "Login page v2"},
                    {"field": "issuetype", "fieldId": "issuetype", "fromString": "Story", "toString": "Bug"}
                ]
            }));
        let edited: JiraIssue = serde_json::from_value(raw).unwrap();
        let second = edited.events_since(epoch, &config).unwrap();

        assert_eq!(first[0].event_type, IssueEventType::IssueCreated);
        assert_eq!(second[0].event_type, IssueEventType::IssueCreated);
        assert_eq!(second[0].field("title"), Some("Login page"));
        assert_eq!(second[0].field("type"), Some("Story"));
        assert_eq!(first[0].fingerprint(), second[0].fingerprint());
        assert!(
            second
                .iter()
                .any(|event| event.event_type == IssueEventType::IssueTitleChanged)
        );
    }

    #[test]
    fn truncated_detail_pages_are_detected() {
        let mut raw = issue_json();
        raw["fields"]["comment"]["total"] = json!(3);
        raw["changelog"]["total"] = json!(150);
        let truncated: JiraIssue = serde_json::from_value(raw).unwrap();
        assert!(!truncated.fields.comment.as_ref().unwrap().is_complete());
        assert!(!truncated.changelog.as_ref().unwrap().is_complete());

        let full = parsed();
        assert!(full.fields.comment.as_ref().unwrap().is_complete());
        assert!(full.changelog.as_ref().unwrap().is_complete());

        let page: JiraChangelogPage = serde_json::from_value(json!({
            "startAt": 0, "maxResults": 100, "total": 2, "isLast": true,
            "values": [
                {"created": "2024-03-01T12:00:00.000+0000", "items": []},
                {"created": "2024-03-02T12:00:00.000+0000", "items": []}
            ]
        }))
        .unwrap();
        assert!(page.is_last);
        let changelog = JiraChangelog::from(page.values);
        assert_eq!(changelog.histories.len(), 2);
        assert!(changelog.is_complete());
    }

    #[tokio::test]
    async fn foreign_project_is_rejected() {
        let connector = JiraConnector::new(None, None, None);
        let err = connector
            .list_issues(Uuid::from_u128(99), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
