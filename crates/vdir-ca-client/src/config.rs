//! Certificate authority client configuration.
//!
//! Defaults point at the production IoT issuing endpoint. Override via
//! environment variables or explicit construction for staging and tests.

use url::Url;
use zeroize::Zeroizing;

/// Connection settings for the certificate authority API.
///
/// Custom `Debug` implementation redacts the password.
#[derive(Clone)]
pub struct SectigoConfig {
    /// API base URL. Default: <https://iot.sectigo.com>
    pub base_url: Url,
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: Zeroizing<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SectigoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectigoConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SectigoConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SECTIGO_URL` (default: `https://iot.sectigo.com`)
    /// - `SECTIGO_USERNAME` (required)
    /// - `SECTIGO_PASSWORD` (required)
    /// - `SECTIGO_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let username =
            std::env::var("SECTIGO_USERNAME").map_err(|_| ConfigError::MissingCredentials)?;
        let password =
            std::env::var("SECTIGO_PASSWORD").map_err(|_| ConfigError::MissingCredentials)?;

        Ok(Self {
            base_url: env_url("SECTIGO_URL", "https://iot.sectigo.com")?,
            username,
            password: Zeroizing::new(password),
            timeout_secs: std::env::var("SECTIGO_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Configuration pointing at a local mock server (for testing).
    pub fn local_mock(port: u16, username: &str, password: &str) -> Result<Self, ConfigError> {
        let raw = format!("http://127.0.0.1:{port}");
        Ok(Self {
            base_url: Url::parse(&raw)
                .map_err(|e| ConfigError::InvalidUrl("localhost".to_string(), e.to_string()))?,
            username: username.to_string(),
            password: Zeroizing::new(password.to_string()),
            timeout_secs: 5,
        })
    }

    /// Absolute URL for an API path.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SECTIGO_USERNAME and SECTIGO_PASSWORD environment variables are required")]
    MissingCredentials,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
