//! Idempotency guard for one-time side effects.
//!
//! Awarding experience points for joining an event is the motivating case:
//! the award must happen at most once per user and event even when the log
//! that triggered it is retried.

use std::future::Future;

use async_trait::async_trait;

use crate::Result;

/// Per-user, per-event claim flags.
#[async_trait]
pub trait ClaimGuard: Send + Sync {
    async fn has_claimed(&self, user_id: &str, event_id: &str) -> Result<bool>;

    /// Record the claim atomically; returns false when it already existed.
    async fn mark_claimed(&self, user_id: &str, event_id: &str) -> Result<bool>;

    async fn release_claim(&self, user_id: &str, event_id: &str) -> Result<()>;
}

/// Take the claim, then run `effect`.
///
/// Returns `None` when the claim was already taken, including by a concurrent
/// caller whose effect is still running. A failing effect releases the claim
/// so a later call can try again.
pub async fn claim_once<G, F, Fut, T>(
    guard: &G,
    user_id: &str,
    event_id: &str,
    effect: F,
) -> Result<Option<T>>
where
    G: ClaimGuard + ?Sized,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    if !guard.mark_claimed(user_id, event_id).await? {
        tracing::debug!("Claim for user {user_id} on event {event_id} already recorded");
        return Ok(None);
    }

    match effect().await {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            if let Err(release_error) = guard.release_claim(user_id, event_id).await {
                tracing::error!(
                    "Failed to release claim for user {user_id} on event {event_id}: {release_error}"
                );
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LocalStore;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn effect_runs_once_per_user_and_event() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let awarded = AtomicU32::new(0);

        for _ in 0..3 {
            claim_once(&store, "u1", "evt-1", || async {
                awarded.fetch_add(50, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }
        assert_eq!(awarded.load(Ordering::SeqCst), 50);

        let second_event = claim_once(&store, "u1", "evt-2", || async { Ok(10) })
            .await
            .unwrap();
        assert_eq!(second_event, Some(10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_effect_leaves_claim_open() {
        let store = LocalStore::open_in_memory().await.unwrap();

        let result = claim_once(&store, "u1", "evt-1", || async {
            Err::<(), _>(Error::InvalidInput("xp service unavailable".into()))
        })
        .await;
        assert!(result.is_err());
        assert!(!store.has_claimed("u1", "evt-1").await.unwrap());

        let retried = claim_once(&store, "u1", "evt-1", || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(retried, Some(()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_claims_run_the_effect_once() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let runs = &AtomicU32::new(0);
        let award = move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(50)
        };

        let (first, second) = tokio::join!(
            claim_once(&store, "u1", "evt-1", award),
            claim_once(&store, "u1", "evt-1", award)
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let mut outcomes = [first.unwrap(), second.unwrap()];
        outcomes.sort_unstable();
        assert_eq!(outcomes, [None, Some(50)]);
        assert!(store.has_claimed("u1", "evt-1").await.unwrap());
    }
}
