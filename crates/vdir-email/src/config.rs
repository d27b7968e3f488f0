//! Email configuration.

use url::Url;
use zeroize::Zeroizing;

const DEFAULT_ADDRESS: &str = "admin@vaspdirectory.net";

/// Sender, administrator and delivery settings.
///
/// Custom `Debug` implementation redacts the API key.
#[derive(Clone)]
pub struct EmailConfig {
    /// Address messages are sent from.
    pub service_email: String,
    /// Address review requests are sent to.
    pub admin_email: String,
    /// SendGrid API key; `None` selects the mock mailer.
    pub sendgrid_api_key: Option<Zeroizing<String>>,
    /// SendGrid API base URL.
    pub sendgrid_url: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("service_email", &self.service_email)
            .field("admin_email", &self.admin_email)
            .field(
                "sendgrid_api_key",
                &self.sendgrid_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sendgrid_url", &self.sendgrid_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `VDIR_SERVICE_EMAIL` (default: `admin@vaspdirectory.net`)
    /// - `VDIR_ADMIN_EMAIL` (default: `admin@vaspdirectory.net`)
    /// - `SENDGRID_API_KEY` (optional; absent selects the mock mailer)
    /// - `SENDGRID_URL` (default: `https://api.sendgrid.com`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = std::env::var("SENDGRID_URL")
            .unwrap_or_else(|_| "https://api.sendgrid.com".to_string());
        let sendgrid_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("SENDGRID_URL".to_string(), e.to_string()))?;

        Ok(Self {
            service_email: env_address("VDIR_SERVICE_EMAIL")?,
            admin_email: env_address("VDIR_ADMIN_EMAIL")?,
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(Zeroizing::new),
            sendgrid_url,
            timeout_secs: 30,
        })
    }

    /// Configuration pointing at a local mock server (for testing).
    pub fn local_mock(port: u16, api_key: Option<&str>) -> Result<Self, ConfigError> {
        let raw = format!("http://127.0.0.1:{port}");
        Ok(Self {
            service_email: "directory@example.com".to_string(),
            admin_email: "admins@example.com".to_string(),
            sendgrid_api_key: api_key.map(|k| Zeroizing::new(k.to_string())),
            sendgrid_url: Url::parse(&raw)
                .map_err(|e| ConfigError::InvalidUrl("localhost".to_string(), e.to_string()))?,
            timeout_secs: 5,
        })
    }
}

fn env_address(var: &str) -> Result<String, ConfigError> {
    let value = std::env::var(var).unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
    if !value.contains('@') {
        return Err(ConfigError::InvalidAddress(var.to_string(), value));
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid email address in {0}: {1:?}")]
    InvalidAddress(String, String),
}
