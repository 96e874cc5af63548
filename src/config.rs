use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub webauthn: WebAuthnConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
    #[serde(default)]
    pub previous_secrets: Vec<String>,
    #[serde(default = "default_access_token_expire")]
    pub access_token_expire_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebAuthnConfig {
    #[serde(default = "default_rp_id")]
    pub rp_id: String,
    #[serde(default = "default_rp_name")]
    pub rp_name: String,
    #[serde(default = "default_rp_origin")]
    pub rp_origin: String,
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: i64,
    #[serde(default = "default_handoff_ttl")]
    pub handoff_ttl_secs: i64,
    #[serde(default = "default_ceremony_timeout")]
    pub ceremony_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    /// Optional webhook receiving account events; unset disables delivery
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1786
}

fn default_db_path() -> String {
    "data/nestegg.db".to_string()
}

fn default_jwt_secret() -> String {
    "your-super-secret-key-change-it".to_string()
}

fn default_access_token_expire() -> u64 {
    30 // 30 minutes
}

fn default_rp_id() -> String {
    "localhost".to_string()
}

fn default_rp_name() -> String {
    "NestEgg".to_string()
}

fn default_rp_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_challenge_ttl() -> i64 {
    300 // 5 minutes, single ceremony window
}

fn default_handoff_ttl() -> i64 {
    300
}

fn default_ceremony_timeout() -> u64 {
    60_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            previous_secrets: Vec::new(),
            access_token_expire_minutes: default_access_token_expire(),
        }
    }
}

impl Default for WebAuthnConfig {
    fn default() -> Self {
        Self {
            rp_id: default_rp_id(),
            rp_name: default_rp_name(),
            rp_origin: default_rp_origin(),
            challenge_ttl_secs: default_challenge_ttl(),
            handoff_ttl_secs: default_handoff_ttl(),
            ceremony_timeout_ms: default_ceremony_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            webauthn: WebAuthnConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        config.ensure_jwt_secret()?;
        config.ensure_webauthn_defaults();
        tracing::info!(
            "WebAuthn config: rp_id={}, rp_origin={}, rp_name={}",
            config.webauthn.rp_id,
            config.webauthn.rp_origin,
            config.webauthn.rp_name
        );
        Ok(config)
    }

    /// Ensure JWT secret is secure and persisted
    fn ensure_jwt_secret(&mut self) -> anyhow::Result<()> {
        if self.jwt.secret == default_jwt_secret() || self.jwt.secret.is_empty() {
            let secret_path = Path::new("data/.jwt_secret");

            if secret_path.exists() {
                let secret = fs::read_to_string(secret_path)?;
                self.jwt.secret = secret.trim().to_string();
                tracing::info!("Loaded persisted JWT secret from data/.jwt_secret");
            } else {
                let secret = uuid::Uuid::new_v4().to_string();

                if let Some(parent) = secret_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                fs::write(secret_path, &secret)?;
                self.jwt.secret = secret;
                tracing::info!("Generated and persisted new JWT secret to data/.jwt_secret");
            }
        }
        Ok(())
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: NE_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("NE_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("NE_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("NE_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // JWT overrides
        if let Ok(val) = env::var("NE_CONF_JWT_SECRET") {
            self.jwt.secret = val;
        }
        if let Ok(val) = env::var("NE_CONF_JWT_PREVIOUS_SECRETS") {
            self.jwt.previous_secrets = val
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
        }
        if let Ok(val) = env::var("NE_CONF_JWT_ACCESS_EXPIRE") {
            if let Ok(minutes) = val.parse() {
                self.jwt.access_token_expire_minutes = minutes;
            }
        }

        // WebAuthn overrides
        if let Ok(val) = env::var("NE_CONF_WEBAUTHN_RP_ID") {
            if !val.trim().is_empty() {
                self.webauthn.rp_id = val;
            }
        }
        if let Ok(val) = env::var("NE_CONF_WEBAUTHN_RP_NAME") {
            if !val.trim().is_empty() {
                self.webauthn.rp_name = val;
            }
        }
        if let Ok(val) = env::var("NE_CONF_WEBAUTHN_RP_ORIGIN") {
            if !val.trim().is_empty() {
                self.webauthn.rp_origin = val;
            }
        }
        if let Ok(val) = env::var("NE_CONF_WEBAUTHN_CHALLENGE_TTL") {
            if let Ok(secs) = val.parse() {
                self.webauthn.challenge_ttl_secs = secs;
            }
        }
        if let Ok(val) = env::var("NE_CONF_WEBAUTHN_HANDOFF_TTL") {
            if let Ok(secs) = val.parse() {
                self.webauthn.handoff_ttl_secs = secs;
            }
        }

        // Notification overrides
        if let Ok(val) = env::var("NE_CONF_NOTIFY_WEBHOOK_URL") {
            if !val.trim().is_empty() {
                self.notify.webhook_url = Some(val);
            }
        }
    }

    fn ensure_webauthn_defaults(&mut self) {
        if self.webauthn.rp_id.trim().is_empty() {
            self.webauthn.rp_id = default_rp_id();
        }
        if self.webauthn.rp_name.trim().is_empty() {
            self.webauthn.rp_name = default_rp_name();
        }
        if self.webauthn.rp_origin.trim().is_empty() {
            self.webauthn.rp_origin = default_rp_origin();
        }
        if self.webauthn.challenge_ttl_secs <= 0 {
            self.webauthn.challenge_ttl_secs = default_challenge_ttl();
        }
        if self.webauthn.handoff_ttl_secs <= 0 {
            self.webauthn.handoff_ttl_secs = default_handoff_ttl();
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
