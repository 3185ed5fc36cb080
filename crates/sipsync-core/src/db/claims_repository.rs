//! Claims repository implementation

use crate::error::Result;
use libsql::Connection;

/// Trait for one-time claim storage (async)
#[allow(async_fn_in_trait)]
pub trait ClaimsRepository {
    /// Whether the user already claimed the event
    async fn has_claimed(&self, user_id: &str, event_id: &str) -> Result<bool>;

    /// Record a claim; returns false when it already existed
    async fn mark_claimed(&self, user_id: &str, event_id: &str, now_ms: i64) -> Result<bool>;

    /// Drop a claim so it can be taken again
    async fn release_claim(&self, user_id: &str, event_id: &str) -> Result<()>;
}

/// libSQL implementation of `ClaimsRepository`
pub struct LibSqlClaimsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlClaimsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ClaimsRepository for LibSqlClaimsRepository<'_> {
    async fn has_claimed(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM claims WHERE user_id = ? AND event_id = ?)",
                libsql::params![user_id, event_id],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }

    async fn mark_claimed(&self, user_id: &str, event_id: &str, now_ms: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO claims (user_id, event_id, claimed_at) VALUES (?, ?, ?)",
                libsql::params![user_id, event_id, now_ms],
            )
            .await?;

        Ok(rows > 0)
    }

    async fn release_claim(&self, user_id: &str, event_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM claims WHERE user_id = ? AND event_id = ?",
                libsql::params![user_id, event_id],
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_claim_is_recorded_once() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlClaimsRepository::new(db.connection());

        assert!(!repo.has_claimed("u1", "evt-1").await.unwrap());
        assert!(repo.mark_claimed("u1", "evt-1", 10).await.unwrap());
        assert!(!repo.mark_claimed("u1", "evt-1", 20).await.unwrap());
        assert!(repo.has_claimed("u1", "evt-1").await.unwrap());

        assert!(!repo.has_claimed("u2", "evt-1").await.unwrap());
        assert!(!repo.has_claimed("u1", "evt-2").await.unwrap());

        repo.release_claim("u1", "evt-1").await.unwrap();
        assert!(!repo.has_claimed("u1", "evt-1").await.unwrap());
        assert!(repo.mark_claimed("u1", "evt-1", 30).await.unwrap());
    }
}
