//! Optimistic read-modify-write over a single event document

use tracing::warn;
use crate::config::MembershipConfig;
use crate::models::Event;
use crate::utils::errors::{StudyGroupError, Result};
use crate::utils::helpers::backoff_with_jitter;
use crate::utils::logging::log_transaction_conflict;
use super::store::DocumentStore;

/// Re-read the event, apply `mutate`, and write it back guarded by the
/// revision that was read. On conflict the whole read-modify-write is
/// retried with jittered exponential backoff. Errors returned by `mutate`
/// abort the transaction immediately without writing.
///
/// Returns the committed event (with its new revision).
pub async fn run_event_transaction<F>(
    store: &dyn DocumentStore,
    event_id: &str,
    policy: &MembershipConfig,
    mut mutate: F,
) -> Result<Event>
where
    F: FnMut(&mut Event) -> Result<()> + Send,
{
    let attempts = policy.max_transaction_attempts.max(1);

    for attempt in 0..attempts {
        let current = store
            .find_event(event_id)
            .await?
            .ok_or_else(|| StudyGroupError::event_not_found(event_id))?;

        let expected_version = current.version;
        let mut updated = current;
        mutate(&mut updated)?;

        if store.replace_event_if_version(&updated, expected_version).await? {
            updated.version = expected_version + 1;
            return Ok(updated);
        }

        if attempt + 1 < attempts {
            let delay = backoff_with_jitter(attempt, policy.base_backoff_ms, policy.max_backoff_ms);
            log_transaction_conflict(event_id, attempt + 1, delay.as_millis() as u64);
            tokio::time::sleep(delay).await;
        }
    }

    warn!(event_id = event_id, attempts = attempts, "Optimistic transaction gave up after repeated conflicts");
    Err(StudyGroupError::TransientStore(format!(
        "Too much contention on event {} ({} attempts)",
        event_id, attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::database::memory::MemoryStore;
    use crate::models::GeoPoint;

    fn policy(attempts: u32) -> MembershipConfig {
        MembershipConfig {
            max_transaction_attempts: attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    async fn store_with_event() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_event(&Event {
                id: "e".to_string(),
                title: "Organic chemistry".to_string(),
                description: String::new(),
                date: Utc::now(),
                location: GeoPoint::new(0.0, 0.0),
                location_name: String::new(),
                host_id: "host".to_string(),
                host_name: String::new(),
                host_profile_pic: None,
                created_at: Utc::now(),
                max_participants: 2,
                current_participants: 0,
                tags: vec![],
                participants: vec![],
                pending_participants: vec![],
                version: 0,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_commits_mutation() {
        let store = store_with_event().await;
        let event = run_event_transaction(&store, "e", &policy(3), |e| {
            e.add_participant("u");
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(event.version, 1);
        assert_eq!(store.find_event("e").await.unwrap().unwrap().participants, vec!["u"]);
    }

    #[tokio::test]
    async fn test_retries_after_conflict() {
        let store = store_with_event().await;
        store.force_conflicts(2);

        let mut calls = 0;
        let event = run_event_transaction(&store, "e", &policy(3), |e| {
            calls += 1;
            e.add_participant("u");
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(event.current_participants, 1);
    }

    #[tokio::test]
    async fn test_gives_up_with_transient_error() {
        let store = store_with_event().await;
        store.force_conflicts(10);

        let result = run_event_transaction(&store, "e", &policy(2), |_| Ok(())).await;
        assert!(matches!(result, Err(StudyGroupError::TransientStore(_))));
    }

    #[tokio::test]
    async fn test_mutation_error_aborts_without_write() {
        let store = store_with_event().await;
        let result = run_event_transaction(&store, "e", &policy(3), |_| {
            Err(StudyGroupError::InvalidArgument("nope".into()))
        })
        .await;

        assert!(matches!(result, Err(StudyGroupError::InvalidArgument(_))));
        assert_eq!(store.find_event("e").await.unwrap().unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_missing_event() {
        let store = MemoryStore::new();
        let result = run_event_transaction(&store, "missing", &policy(3), |_| Ok(())).await;
        assert!(matches!(result, Err(StudyGroupError::NotFound { .. })));
    }
}
