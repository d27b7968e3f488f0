//! Server configuration loaded from the environment.

use std::net::SocketAddr;

use thiserror::Error;
use zeroize::Zeroizing;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4433";

/// Default directory id stamped on registrations and batch names.
pub const DEFAULT_DIRECTORY_ID: &str = "vaspdirectory.net";

/// Errors raised while reading server configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid bind address {0:?}: {1}")]
    InvalidBindAddr(String, String),

    #[error("VDIR_SECRET_KEY must be set to a non-empty value")]
    MissingSecretKey,
}

/// Directory service configuration.
///
/// Custom `Debug` redacts the secret key and admin token.
#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Store connection string (`memory:` or `sqlite:<path>`).
    pub database: String,
    /// Server secret used to encrypt PKCS12 passwords at rest.
    pub secret_key: Zeroizing<String>,
    pub directory_id: String,
    /// Bearer token for the admin routes. `None` leaves them open.
    pub admin_token: Option<String>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database)
            .field("secret_key", &"[REDACTED]")
            .field("directory_id", &self.directory_id)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `VDIR_BIND_ADDR` (default: `0.0.0.0:4433`)
    /// - `VDIR_DATABASE` (default: `memory:`)
    /// - `VDIR_SECRET_KEY` (required)
    /// - `VDIR_DIRECTORY_ID` (default: `vaspdirectory.net`)
    /// - `VDIR_ADMIN_TOKEN` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_addr =
            std::env::var("VDIR_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidBindAddr(raw_addr.clone(), e.to_string())
            })?;

        let secret_key = std::env::var("VDIR_SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecretKey)?;

        Ok(Self {
            bind_addr,
            database: std::env::var("VDIR_DATABASE").unwrap_or_else(|_| "memory:".to_string()),
            secret_key: Zeroizing::new(secret_key),
            directory_id: std::env::var("VDIR_DIRECTORY_ID")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DIRECTORY_ID.to_string()),
            admin_token: std::env::var("VDIR_ADMIN_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }
}
