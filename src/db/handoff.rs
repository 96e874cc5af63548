use chrono::{Duration, Utc};

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{HandoffSession, HandoffStatus};

/// Store for cross-device registration hand-off sessions.
///
/// A session is written once, transitions to a terminal status exactly once
/// (guarded UPDATE on `status = 'pending'`), and is read-only afterwards.
pub struct HandoffStore;

impl HandoffStore {
    pub async fn insert(
        db: &Database,
        id: &str,
        email: &str,
        options_json: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let expires_at = (now + Duration::seconds(ttl_secs)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO handoff_sessions (id, email, options_json, status, expires_at, created_at)
            VALUES (?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(options_json)
        .bind(&expires_at)
        .bind(now.to_rfc3339())
        .execute(db.pool())
        .await?;

        Ok(())
    }

    pub async fn find(db: &Database, id: &str) -> Result<Option<HandoffSession>> {
        let session: Option<HandoffSession> =
            sqlx::query_as("SELECT * FROM handoff_sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(db.pool())
                .await?;
        Ok(session)
    }

    /// Single terminal transition. Expired-but-pending sessions report
    /// `SessionNotFound` (the TTL is the backstop); already-terminal ones
    /// report `AlreadyCompleted`.
    pub async fn complete(
        db: &Database,
        id: &str,
        status: HandoffStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        debug_assert!(status.is_terminal());
        let now = Utc::now().to_rfc3339();

        let affected = sqlx::query(
            r#"
            UPDATE handoff_sessions
            SET status = ?, result_detail = ?, completed_at = ?
            WHERE id = ? AND status = 'pending' AND expires_at > ?
            "#,
        )
        .bind(status.as_str())
        .bind(detail)
        .bind(&now)
        .bind(id)
        .bind(&now)
        .execute(db.pool())
        .await?
        .rows_affected();

        if affected == 1 {
            return Ok(());
        }

        match Self::find(db, id).await? {
            Some(s) if s.status().is_terminal() => Err(AppError::AlreadyCompleted),
            _ => Err(AppError::SessionNotFound),
        }
    }

    /// Drop sessions whose TTL lapsed long enough ago that nobody is still
    /// polling them. Called from the background reaper only.
    pub async fn purge_stale(db: &Database, grace_secs: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::seconds(grace_secs)).to_rfc3339();
        let affected = sqlx::query("DELETE FROM handoff_sessions WHERE expires_at < ?")
            .bind(&cutoff)
            .execute(db.pool())
            .await?
            .rows_affected();
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn complete_transitions_exactly_once() {
        let db = test_db().await;
        HandoffStore::insert(&db, "s1", "a@b.c", "{}", 300).await.unwrap();

        HandoffStore::complete(&db, "s1", HandoffStatus::Success, None)
            .await
            .unwrap();

        let err = HandoffStore::complete(&db, "s1", HandoffStatus::Failure, Some("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyCompleted));

        let session = HandoffStore::find(&db, "s1").await.unwrap().unwrap();
        assert_eq!(session.status(), HandoffStatus::Success);
    }

    #[tokio::test]
    async fn complete_after_expiry_reports_session_not_found() {
        let db = test_db().await;
        HandoffStore::insert(&db, "s1", "a@b.c", "{}", -1).await.unwrap();

        let err = HandoffStore::complete(&db, "s1", HandoffStatus::Success, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound));
    }

    #[tokio::test]
    async fn complete_unknown_session_reports_session_not_found() {
        let db = test_db().await;
        let err = HandoffStore::complete(&db, "missing", HandoffStatus::Failure, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound));
    }
}
