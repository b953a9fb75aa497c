//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment, so a
//! single `from_env()` pass at startup is enough.

use std::env;
use std::path::PathBuf;

/// Which store backs users, sessions and sightings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS and federated-login redirects
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Storage backend selection
    pub storage_backend: StorageBackend,
    /// Directory holding uploaded photo blobs
    pub upload_dir: PathBuf,
    /// Identity provider login page
    pub federated_auth_url: String,
    /// Identity provider endpoint resolving a provider session id
    pub federated_session_url: String,
    /// Sliding session lifetime
    pub session_ttl: chrono::Duration,
    /// Lifetime of a one-time federated exchange code
    pub exchange_code_ttl: chrono::Duration,

    // --- Secrets ---
    /// HMAC key for signing the federated-login state parameter
    pub oauth_state_key: Vec<u8>,
}

impl Config {
    /// Config for tests: in-memory storage, uploads in a fresh temp directory.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            upload_dir: env::temp_dir().join(format!("tracklog-test-{}", uuid::Uuid::new_v4())),
            federated_auth_url: "https://auth.example.com/".to_string(),
            federated_session_url: "https://auth.example.com/session-data".to_string(),
            session_ttl: chrono::Duration::days(DEFAULT_SESSION_TTL_DAYS),
            exchange_code_ttl: chrono::Duration::seconds(DEFAULT_EXCHANGE_CODE_TTL_SECS),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StorageBackend::Firestore,
            "memory" => StorageBackend::Memory,
            other => return Err(ConfigError::Invalid("STORAGE_BACKEND", other.to_string())),
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            storage_backend,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            federated_auth_url: env::var("FEDERATED_AUTH_URL")
                .map_err(|_| ConfigError::Missing("FEDERATED_AUTH_URL"))?,
            federated_session_url: env::var("FEDERATED_SESSION_URL")
                .map_err(|_| ConfigError::Missing("FEDERATED_SESSION_URL"))?,
            session_ttl: chrono::Duration::days(parse_or(
                "SESSION_TTL_DAYS",
                DEFAULT_SESSION_TTL_DAYS,
                MAX_SESSION_TTL_DAYS,
            )?),
            exchange_code_ttl: chrono::Duration::seconds(parse_or(
                "EXCHANGE_CODE_TTL_SECS",
                DEFAULT_EXCHANGE_CODE_TTL_SECS,
                MAX_EXCHANGE_CODE_TTL_SECS,
            )?),

            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
        })
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

const DEFAULT_SESSION_TTL_DAYS: i64 = 7;
const DEFAULT_EXCHANGE_CODE_TTL_SECS: i64 = 5 * 60;
const MAX_SESSION_TTL_DAYS: i64 = 365;
const MAX_EXCHANGE_CODE_TTL_SECS: i64 = 60 * 60;

fn parse_or(name: &'static str, default: i64, max: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_in_range(name, raw, max),
        Err(_) => Ok(default),
    }
}

/// Parse a count in `1..=max`.
fn parse_in_range(name: &'static str, raw: String, max: i64) -> Result<i64, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|v| (1..=max).contains(v))
        .ok_or(ConfigError::Invalid(name, raw))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
