use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::User;

/// User directory. The ceremony controllers only ever resolve users by
/// email or id; account management beyond that lives in the auth service.
pub struct UserStore;

impl UserStore {
    pub async fn find_by_email(db: &Database, email: &str) -> Result<User> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(db.pool())
            .await?;
        user.ok_or(AppError::UserNotFound)
    }

    pub async fn find_by_id(db: &Database, id: &str) -> Result<User> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db.pool())
            .await?;
        user.ok_or(AppError::UserNotFound)
    }

    pub async fn email_exists(db: &Database, email: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(db.pool())
            .await?;
        Ok(count.0 > 0)
    }

    pub async fn insert(db: &Database, email: &str, name: &str, password_hash: &str) -> Result<User> {
        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user_id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Self::find_by_id(db, &user_id).await
    }
}
