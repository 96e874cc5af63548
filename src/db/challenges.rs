use chrono::{Duration, Utc};

use crate::db::Database;
use crate::error::Result;
use crate::models::{ChallengePurpose, PendingChallenge};

/// Short-lived ceremony state, keyed by user or by an anonymous session key.
///
/// One outstanding ceremony per key: `put` is last-writer-wins, so a second
/// `begin` silently invalidates the first challenge. Consumption is a single
/// `DELETE .. RETURNING`, which makes double-submission a race exactly one
/// caller can win. TTL is enforced passively at take time; the background
/// reaper only keeps the table small.
pub struct ChallengeCache;

impl ChallengeCache {
    pub async fn put(
        db: &Database,
        key: &str,
        challenge: &str,
        purpose: ChallengePurpose,
        ttl_secs: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let expires_at = (now + Duration::seconds(ttl_secs)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO webauthn_challenges (key, challenge, purpose, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                challenge = excluded.challenge,
                purpose = excluded.purpose,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(challenge)
        .bind(purpose.as_str())
        .bind(&expires_at)
        .bind(now.to_rfc3339())
        .execute(db.pool())
        .await?;

        Ok(())
    }

    /// Atomic read-then-delete. Returns `None` when the key was never
    /// issued, already consumed, or expired; expired rows are consumed by
    /// the take and never honored.
    pub async fn take_and_invalidate(db: &Database, key: &str) -> Result<Option<PendingChallenge>> {
        let row: Option<PendingChallenge> = sqlx::query_as(
            r#"
            DELETE FROM webauthn_challenges WHERE key = ?
            RETURNING key, challenge, purpose, expires_at, created_at
            "#,
        )
        .bind(key)
        .fetch_optional(db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expired = chrono::DateTime::parse_from_rfc3339(&row.expires_at)
            .map(|exp| exp < Utc::now())
            .unwrap_or(true);
        if expired {
            return Ok(None);
        }

        Ok(Some(row))
    }

    /// Drop expired rows. Called from the background reaper only.
    pub async fn purge_expired(db: &Database) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query("DELETE FROM webauthn_challenges WHERE expires_at < ?")
            .bind(&now)
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
    async fn take_consumes_exactly_once() {
        let db = test_db().await;
        ChallengeCache::put(&db, "user:1", "abc", ChallengePurpose::Registration, 300)
            .await
            .unwrap();

        let first = ChallengeCache::take_and_invalidate(&db, "user:1")
            .await
            .unwrap();
        assert_eq!(first.unwrap().challenge, "abc");

        let second = ChallengeCache::take_and_invalidate(&db, "user:1")
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn put_overwrites_previous_challenge_for_key() {
        let db = test_db().await;
        ChallengeCache::put(&db, "user:1", "first", ChallengePurpose::Registration, 300)
            .await
            .unwrap();
        ChallengeCache::put(&db, "user:1", "second", ChallengePurpose::Registration, 300)
            .await
            .unwrap();

        let taken = ChallengeCache::take_and_invalidate(&db, "user:1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(taken.challenge, "second");
    }

    #[tokio::test]
    async fn expired_challenge_is_not_honored() {
        let db = test_db().await;
        ChallengeCache::put(&db, "user:1", "abc", ChallengePurpose::Authentication, -1)
            .await
            .unwrap();

        let taken = ChallengeCache::take_and_invalidate(&db, "user:1")
            .await
            .unwrap();
        assert!(taken.is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let db = test_db().await;
        ChallengeCache::put(&db, "user:1", "old", ChallengePurpose::Registration, -1)
            .await
            .unwrap();
        ChallengeCache::put(&db, "user:2", "live", ChallengePurpose::Registration, 300)
            .await
            .unwrap();

        let purged = ChallengeCache::purge_expired(&db).await.unwrap();
        assert_eq!(purged, 1);

        let live = ChallengeCache::take_and_invalidate(&db, "user:2")
            .await
            .unwrap();
        assert!(live.is_some());
    }
}
