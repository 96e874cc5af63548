use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{Database, UserStore};
use crate::error::{AppError, Result};
use crate::models::{Claims, CreateUserRequest, LoginRequest, LoginResponse, User, UserResponse};

/// Password login and bearer-token issuance. The passkey ceremonies treat
/// this as the opaque session issuer: they hand over a verified user and
/// get a token back.
pub struct AuthService;

impl AuthService {
    /// Register a new user
    pub async fn register(db: &Database, req: CreateUserRequest) -> Result<UserResponse> {
        if !req.email.contains('@') {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }

        if req.password.len() < 8 {
            return Err(AppError::BadRequest(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        if UserStore::email_exists(db, &req.email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = Self::hash_password(&req.password)?;
        let user = UserStore::insert(db, &req.email, &req.name, &password_hash).await?;

        Ok(UserResponse::from(user))
    }

    /// Login with email and password
    pub async fn login(db: &Database, config: &Config, req: LoginRequest) -> Result<LoginResponse> {
        let user = UserStore::find_by_email(db, &req.email)
            .await
            .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

        if !Self::verify_password(&req.password, &user.password_hash)? {
            return Err(AppError::Unauthorized("Invalid email or password".to_string()));
        }

        Self::issue_session(config, user)
    }

    /// Issue a session for an already-verified user (passkey login path)
    pub fn issue_session(config: &Config, user: User) -> Result<LoginResponse> {
        let token = Self::issue_token(config, &user)?;
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: config.jwt.access_token_expire_minutes * 60,
            user: UserResponse::from(user),
        })
    }

    /// Generate access token (JWT)
    pub fn issue_token(config: &Config, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(config.jwt.access_token_expire_minutes as i64);

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate access token and extract claims
    pub fn validate_token(token: &str, config: &Config) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let keys = std::iter::once(config.jwt.secret.as_str())
            .chain(config.jwt.previous_secrets.iter().map(|s| s.as_str()));

        for secret in keys {
            if let Ok(token_data) = decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            ) {
                return Ok(token_data.claims);
            }
        }

        Err(AppError::Unauthorized("Invalid token".to_string()))
    }

    /// Hash password using Argon2
    fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify password against hash
    fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let db = test_db().await;
        let config = Config::default();

        AuthService::register(
            &db,
            CreateUserRequest {
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                password: "correct-horse".to_string(),
            },
        )
        .await
        .unwrap();

        let response = AuthService::login(
            &db,
            &config,
            LoginRequest {
                email: "alice@example.com".to_string(),
                password: "correct-horse".to_string(),
            },
        )
        .await
        .unwrap();

        let claims = AuthService::validate_token(&response.token, &config).unwrap();
        assert_eq!(claims.email, "alice@example.com");
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let db = test_db().await;
        let config = Config::default();

        AuthService::register(
            &db,
            CreateUserRequest {
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                password: "correct-horse".to_string(),
            },
        )
        .await
        .unwrap();

        let err = AuthService::login(
            &db,
            &config,
            LoginRequest {
                email: "alice@example.com".to_string(),
                password: "wrong".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = test_db().await;

        let req = || CreateUserRequest {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            password: "correct-horse".to_string(),
        };

        AuthService::register(&db, req()).await.unwrap();
        let err = AuthService::register(&db, req()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
