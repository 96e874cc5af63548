use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{NewCredential, PasskeyCredential};

/// Persistent store for registered passkeys.
///
/// `credential_id` is globally unique (UNIQUE index); a second registration
/// of the same physical authenticator fails here regardless of which
/// account attempts it, including under concurrent requests.
pub struct CredentialStore;

impl CredentialStore {
    pub async fn find_by_user(db: &Database, user_id: &str) -> Result<Vec<PasskeyCredential>> {
        let creds: Vec<PasskeyCredential> = sqlx::query_as(
            "SELECT * FROM passkey_credentials WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(db.pool())
        .await?;
        Ok(creds)
    }

    pub async fn find_by_credential_id(
        db: &Database,
        credential_id: &str,
    ) -> Result<Option<PasskeyCredential>> {
        let cred: Option<PasskeyCredential> =
            sqlx::query_as("SELECT * FROM passkey_credentials WHERE credential_id = ?")
                .bind(credential_id)
                .fetch_optional(db.pool())
                .await?;
        Ok(cred)
    }

    pub async fn insert(db: &Database, new: NewCredential) -> Result<PasskeyCredential> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let transports = new
            .transports
            .as_ref()
            .map(|t| serde_json::to_string(t).unwrap_or_else(|_| "[]".to_string()));

        let result = sqlx::query(
            r#"
            INSERT INTO passkey_credentials
                (id, user_id, credential_id, public_key, algorithm, sign_counter,
                 transports, display_name, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.credential_id)
        .bind(&new.public_key)
        .bind(new.algorithm)
        .bind(new.sign_counter)
        .bind(transports.as_deref())
        .bind(&new.display_name)
        .bind(&now)
        .execute(db.pool())
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::DuplicateCredential);
            }
            Err(e) => return Err(e.into()),
        }

        let cred: PasskeyCredential =
            sqlx::query_as("SELECT * FROM passkey_credentials WHERE id = ?")
                .bind(&id)
                .fetch_one(db.pool())
                .await?;
        Ok(cred)
    }

    /// Record a successful assertion. Missing rows are a hard failure: the
    /// credential was verified moments ago and vanished since.
    pub async fn update_counter_and_usage(
        db: &Database,
        credential_id: &str,
        new_counter: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE passkey_credentials SET sign_counter = ?, last_used_at = ? WHERE credential_id = ?",
        )
        .bind(new_counter)
        .bind(&now)
        .bind(credential_id)
        .execute(db.pool())
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Credential vanished during update".to_string()));
        }
        Ok(())
    }

    pub async fn rename(
        db: &Database,
        user_id: &str,
        id: &str,
        display_name: &str,
    ) -> Result<()> {
        let affected =
            sqlx::query("UPDATE passkey_credentials SET display_name = ? WHERE id = ? AND user_id = ?")
                .bind(display_name)
                .bind(id)
                .bind(user_id)
                .execute(db.pool())
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(AppError::NotFound("Passkey not found".to_string()));
        }
        Ok(())
    }

    pub async fn delete(db: &Database, user_id: &str, id: &str) -> Result<()> {
        let affected = sqlx::query("DELETE FROM passkey_credentials WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(db.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::NotFound("Passkey not found".to_string()));
        }
        Ok(())
    }
}
