use clap::Args;

use crate::cache::SyncCursorCache;
use crate::cmd::issues::CommandOutput;
use crate::context::AppContext;
use crate::domain::mapping::IssueMappingConfiguration;
use crate::error::AppResult;
use crate::workflow::sync::collect_new_events;

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Tracker issue ids to poll.
    #[arg(required = true)]
    pub issue_ids: Vec<String>,
}

/// Polls the given issues, prints only events not seen by an earlier run and
/// persists the advanced cursors.
pub async fn run<C: IssueMappingConfiguration>(
    ctx: &AppContext<C>,
    args: SyncArgs,
    cursors: &mut SyncCursorCache,
) -> AppResult<CommandOutput> {
    let events =
        collect_new_events(ctx.connector.as_ref(), &args.issue_ids, &ctx.mapping, cursors).await?;
    cursors.save()?;
    tracing::info!(issues = args.issue_ids.len(), events = events.len(), "sync finished");
    Ok(CommandOutput::Events(events))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::config::AppConfig;
    use crate::domain::issue::{CreateIssueInput, IssueState};
    use crate::domain::mapping::{Vocabulary, VocabularyMap};
    use crate::infra::memory::{InMemoryConnector, MemoryMappingConfiguration};
    use crate::services::ImsConnector;

    #[tokio::test]
    async fn second_run_reports_nothing_new() {
        let mapping = MemoryMappingConfiguration {
            project_id: Uuid::from_u128(7),
            project_key: "SG".to_string(),
            initial_status: "Open".to_string(),
            vocabulary: Vocabulary {
                states: VocabularyMap::new().with(IssueState::Backlog, "Open"),
                issue_types: VocabularyMap::new().with("Bug".to_string(), "bug"),
                ..Vocabulary::default()
            },
        };
        let connector = Arc::new(InMemoryConnector::default());
        let issue = connector
            .create_issue(mapping.project_id, CreateIssueInput::new("Crash", "Bug"), &mapping)
            .await
            .unwrap();
        let config = AppConfig {
            jira_base_url: None,
            jira_email: None,
            jira_token: None,
            mapping_path: None,
        };
        let ctx = AppContext::new(config, connector, mapping);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursors.json");
        let args = SyncArgs {
            issue_ids: vec![issue.id.clone()],
        };

        let mut cursors = SyncCursorCache::load_from(&path).unwrap();
        let first = run(&ctx, args.clone(), &mut cursors).await.unwrap();
        assert!(matches!(&first, CommandOutput::Events(events) if events.len() == 1));

        let mut reloaded = SyncCursorCache::load_from(&path).unwrap();
        let second = run(&ctx, args, &mut reloaded).await.unwrap();
        assert_eq!(second.render(false).unwrap(), "No events.");
    }
}
