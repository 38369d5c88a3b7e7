use chrono::{DateTime, Utc};

use crate::cache::{SyncCursor, SyncCursorCache};
use crate::domain::event::CreateEventInput;
use crate::domain::mapping::IssueMappingConfiguration;
use crate::error::AppResult;
use crate::services::ImsConnector;

/// Polls each issue for events newer than its cursor and returns only the
/// ones not delivered before, oldest first per issue.
///
/// Cursors are advanced in `cursors` but not saved; the caller persists them
/// once the events have been handed on. A failing issue aborts the batch and
/// leaves every cursor as it was, so a retry sees the same events again.
pub async fn collect_new_events<C>(
    connector: &C,
    issue_ids: &[String],
    config: &C::Config,
    cursors: &mut SyncCursorCache,
) -> AppResult<Vec<CreateEventInput>>
where
    C: ImsConnector + ?Sized,
{
    let project_id = config.project_id();
    let mut delivered = Vec::new();
    let mut advanced = Vec::new();

    for issue_id in issue_ids {
        let key = SyncCursorCache::compute_key(&project_id, issue_id);
        let cursor = cursors.get(&key).cloned();
        let since = cursor
            .as_ref()
            .map(|cursor| cursor.since)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let events = connector.events_since(issue_id, since, config).await?;
        let polled = events.len();
        let (fresh, next) = advance(cursor.as_ref(), events);
        tracing::debug!(issue_id = %issue_id, %since, polled, fresh = fresh.len(), "polled issue events");

        if let Some(next) = next {
            advanced.push((key, next));
        }
        delivered.extend(fresh);
    }

    for (key, next) in advanced {
        cursors.insert(key, next);
    }
    Ok(delivered)
}

/// Drops events already covered by `cursor` and computes the cursor that
/// covers everything returned.
pub fn advance(
    cursor: Option<&SyncCursor>,
    mut events: Vec<CreateEventInput>,
) -> (Vec<CreateEventInput>, Option<SyncCursor>) {
    events.sort_by_key(|event| event.timestamp);

    let fresh: Vec<CreateEventInput> = events
        .into_iter()
        .filter(|event| match cursor {
            Some(cursor) if event.timestamp < cursor.since => false,
            Some(cursor) if event.timestamp == cursor.since => {
                !cursor.delivered.contains(&event.fingerprint())
            }
            _ => true,
        })
        .collect();

    let Some(newest) = fresh.last().map(|event| event.timestamp) else {
        return (fresh, None);
    };

    let mut delivered = match cursor {
        Some(cursor) if cursor.since == newest => cursor.delivered.clone(),
        _ => Default::default(),
    };
    delivered.extend(
        fresh
            .iter()
            .filter(|event| event.timestamp == newest)
            .map(CreateEventInput::fingerprint),
    );

    (
        fresh,
        Some(SyncCursor {
            since: newest,
            delivered,
        }),
    )
}
