use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::context::AppContext;
use crate::domain::event::CreateEventInput;
use crate::domain::issue::{
    CreateIssueInput, Issue, IssuePriority, IssueState, TShirtSizeEstimation,
};
use crate::domain::mapping::IssueMappingConfiguration;
use crate::error::AppResult;

#[derive(Args, Debug, Clone)]
pub struct IssuesArgs {
    #[command(subcommand)]
    pub command: IssuesCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum IssuesCommand {
    /// List every issue of the mapped project.
    List,
    /// Show a single issue.
    Show { id: String },
    /// Show tracker changes recorded at or after a point in time.
    Events {
        id: String,
        /// RFC 3339 timestamp, e.g. 2024-05-06T09:00:00Z.
        #[arg(long)]
        since: DateTime<Utc>,
    },
    /// Rename an issue.
    Title { id: String, title: String },
    /// Replace an issue's description.
    Description { id: String, description: String },
    /// Move an issue to another state (BACKLOG, TODO, IN_PROGRESS, IN_REVIEW, DONE).
    State {
        id: String,
        #[arg(value_parser = parse_state)]
        state: IssueState,
    },
    /// Change an issue's priority (LOWEST .. HIGHEST).
    Priority {
        id: String,
        #[arg(value_parser = parse_priority)]
        priority: IssuePriority,
    },
    /// Change an issue's type.
    Type { id: String, type_name: String },
    /// Move an issue into a sprint.
    Sprint { id: String, number: u32 },
    /// Set an issue's t-shirt size (XS .. XXL).
    Estimate {
        id: String,
        #[arg(value_parser = parse_estimation)]
        size: TShirtSizeEstimation,
    },
    /// Assign an issue to a game user.
    Assign { id: String, assignee: Uuid },
    /// Comment on an issue.
    Comment { id: String, text: String },
    /// Create an issue in the mapped project.
    Create(CreateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long = "type")]
    pub issue_type: String,
    #[arg(long, value_parser = parse_state)]
    pub state: Option<IssueState>,
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<IssuePriority>,
    #[arg(long, value_parser = parse_estimation)]
    pub estimate: Option<TShirtSizeEstimation>,
    #[arg(long)]
    pub sprint: Option<u32>,
    #[arg(long)]
    pub assignee: Option<Uuid>,
}

impl From<CreateArgs> for CreateIssueInput {
    fn from(args: CreateArgs) -> Self {
        Self {
            title: args.title,
            description: args.description,
            issue_type: args.issue_type,
            state: args.state,
            priority: args.priority,
            estimation: args.estimate,
            sprint_number: args.sprint,
            assignee_id: args.assignee,
        }
    }
}

fn parse_state(value: &str) -> Result<IssueState, String> {
    IssueState::from_str(value).ok_or_else(|| format!("unknown issue state '{value}'"))
}

fn parse_priority(value: &str) -> Result<IssuePriority, String> {
    IssuePriority::from_str(value).ok_or_else(|| format!("unknown priority '{value}'"))
}

fn parse_estimation(value: &str) -> Result<TShirtSizeEstimation, String> {
    TShirtSizeEstimation::from_str(value).ok_or_else(|| format!("unknown t-shirt size '{value}'"))
}

#[derive(Debug)]
pub enum CommandOutput {
    Issue(Issue),
    Issues(Vec<Issue>),
    Events(Vec<CreateEventInput>),
    NotFound(String),
}

impl CommandOutput {
    pub fn render(&self, as_json: bool) -> AppResult<String> {
        if as_json {
            let value = match self {
                CommandOutput::Issue(issue) => serde_json::to_string_pretty(issue),
                CommandOutput::Issues(issues) => serde_json::to_string_pretty(issues),
                CommandOutput::Events(events) => events
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()
                    .map(|lines| lines.join("\n")),
                CommandOutput::NotFound(_) => Ok("null".to_string()),
            };
            return value.map_err(|err| {
                crate::error::AppError::Configuration(format!("failed to render output: {err}"))
            });
        }

        Ok(match self {
            CommandOutput::Issue(issue) => describe_issue(issue),
            CommandOutput::Issues(issues) if issues.is_empty() => "No issues.".to_string(),
            CommandOutput::Issues(issues) => issues
                .iter()
                .map(summary_line)
                .collect::<Vec<_>>()
                .join("\n"),
            CommandOutput::Events(events) if events.is_empty() => "No events.".to_string(),
            CommandOutput::Events(events) => events
                .iter()
                .map(|event| {
                    format!(
                        "{} {:<26} {} {}",
                        event.timestamp.to_rfc3339(),
                        event.event_type.identifier(),
                        event.issue_id,
                        event.message
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            CommandOutput::NotFound(id) => format!("Issue {id} not found."),
        })
    }
}

fn summary_line(issue: &Issue) -> String {
    format!(
        "{:<10} {:<12} {:<8} {}",
        issue.id,
        issue.state.as_str(),
        issue
            .priority
            .map(|priority| priority.as_str())
            .unwrap_or("-"),
        issue.title
    )
}

fn describe_issue(issue: &Issue) -> String {
    let mut lines = vec![
        format!("{} {}", issue.id, issue.title),
        format!("State:      {}", issue.state),
        format!("Type:       {}", issue.issue_type),
        format!(
            "Priority:   {}",
            issue.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "Estimation: {}",
            issue.estimation.map(|e| e.to_string()).unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "Sprint:     {}",
            issue.sprint_number.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "Assignee:   {}",
            issue.assignee_id.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())
        ),
    ];
    if let Some(url) = &issue.url {
        lines.push(format!("URL:        {url}"));
    }
    if !issue.description.trim().is_empty() {
        lines.push(String::new());
        lines.push(issue.description.clone());
    }
    for comment in &issue.comments {
        lines.push(String::new());
        lines.push(format!("-- comment {} ({})", comment.id, comment.created_at.to_rfc3339()));
        lines.push(comment.body.clone());
    }
    lines.join("\n")
}

pub async fn run<C: IssueMappingConfiguration>(
    ctx: &AppContext<C>,
    command: IssuesCommand,
) -> AppResult<CommandOutput> {
    let connector = ctx.connector.as_ref();
    let mapping = &ctx.mapping;

    let issue = match command {
        IssuesCommand::List => {
            let issues = connector.list_issues(mapping.project_id(), mapping).await?;
            return Ok(CommandOutput::Issues(issues));
        }
        IssuesCommand::Show { id } => {
            return Ok(match connector.find_issue(&id, mapping).await? {
                Some(issue) => CommandOutput::Issue(issue),
                None => CommandOutput::NotFound(id),
            });
        }
        IssuesCommand::Events { id, since } => {
            let events = connector.events_since(&id, since, mapping).await?;
            return Ok(CommandOutput::Events(events));
        }
        IssuesCommand::Title { id, title } => connector.change_title(&id, &title, mapping).await?,
        IssuesCommand::Description { id, description } => {
            connector
                .change_description(&id, &description, mapping)
                .await?
        }
        IssuesCommand::State { id, state } => connector.change_state(&id, state, mapping).await?,
        IssuesCommand::Priority { id, priority } => {
            connector.change_priority(&id, priority, mapping).await?
        }
        IssuesCommand::Type { id, type_name } => {
            connector.change_type(&id, &type_name, mapping).await?
        }
        IssuesCommand::Sprint { id, number } => {
            connector.change_sprint(&id, number, mapping).await?
        }
        IssuesCommand::Estimate { id, size } => {
            connector.change_estimation(&id, size, mapping).await?
        }
        IssuesCommand::Assign { id, assignee } => {
            connector.assign_issue(&id, assignee, mapping).await?
        }
        IssuesCommand::Comment { id, text } => connector.add_comment(&id, &text, mapping).await?,
        IssuesCommand::Create(args) => {
            connector
                .create_issue(mapping.project_id(), args.into(), mapping)
                .await?
        }
    };

    Ok(CommandOutput::Issue(issue))
}
