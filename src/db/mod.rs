pub mod challenges;
pub mod credentials;
pub mod handoff;
pub mod users;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::Result;

pub use challenges::ChallengeCache;
pub use credentials::CredentialStore;
pub use handoff::HandoffStore;
pub use users::UserStore;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // credential_id uniqueness is global across users: the same physical
        // authenticator may never be registered twice, and concurrent
        // registration attempts must be resolved here, not in application code.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS passkey_credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                credential_id TEXT UNIQUE NOT NULL,
                public_key BLOB NOT NULL,
                algorithm INTEGER NOT NULL,
                sign_counter INTEGER NOT NULL DEFAULT 0,
                transports TEXT,
                display_name TEXT NOT NULL DEFAULT 'Passkey',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_used_at TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One outstanding ceremony per key; consumed by DELETE .. RETURNING
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webauthn_challenges (
                key TEXT PRIMARY KEY,
                challenge TEXT NOT NULL,
                purpose TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS handoff_sessions (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                options_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                result_detail TEXT,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                completed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_passkey_credentials_user_id ON passkey_credentials(user_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_webauthn_challenges_expires_at ON webauthn_challenges(expires_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_handoff_sessions_expires_at ON handoff_sessions(expires_at)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    // Single connection so every test statement sees the same in-memory db.
    // Disable foreign-key enforcement (sqlx turns it on by default) so the
    // individual stores can be unit-tested in isolation against synthetic
    // user ids without standing up full parent rows.
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("sqlite connect options")
        .foreign_keys(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("in-memory sqlite");
    let db = Database { pool };
    db.run_migrations().await.expect("migrations");
    db
}
