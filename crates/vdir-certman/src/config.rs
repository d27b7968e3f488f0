//! Cert manager configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default interval between pipeline scans.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// Default directory identifier used in batch names.
pub const DEFAULT_DIRECTORY_ID: &str = "vaspdirectory.net";

/// Scheduling and storage settings for the cert manager.
#[derive(Debug, Clone)]
pub struct CertManConfig {
    /// Time between the start of consecutive scans.
    pub interval: Duration,
    /// Where downloaded archives are kept; `None` uses a directory under
    /// the system temp dir.
    pub storage: Option<PathBuf>,
    /// Identifies this directory in CA batch names.
    pub directory_id: String,
}

impl Default for CertManConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            storage: None,
            directory_id: DEFAULT_DIRECTORY_ID.to_string(),
        }
    }
}

impl CertManConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `VDIR_CERTMAN_INTERVAL_SECS` (default: 600)
    /// - `VDIR_CERTMAN_STORAGE` (default: temp dir)
    /// - `VDIR_DIRECTORY_ID` (default: `vaspdirectory.net`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval = match std::env::var("VDIR_CERTMAN_INTERVAL_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidInterval(raw.clone()))?;
                if secs == 0 {
                    return Err(ConfigError::InvalidInterval(raw));
                }
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_INTERVAL,
        };

        Ok(Self {
            interval,
            storage: std::env::var("VDIR_CERTMAN_STORAGE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            directory_id: std::env::var("VDIR_DIRECTORY_ID")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DIRECTORY_ID.to_string()),
        })
    }

    /// The archive directory, created if missing.
    pub fn storage_dir(&self) -> std::io::Result<PathBuf> {
        let dir = match &self.storage {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join("vdir-certs"),
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("VDIR_CERTMAN_INTERVAL_SECS must be a positive number of seconds, got {0:?}")]
    InvalidInterval(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parsing() {
        std::env::set_var("VDIR_CERTMAN_INTERVAL_SECS", "15");
        let config = CertManConfig::from_env().unwrap();
        assert_eq!(config.interval, Duration::from_secs(15));

        std::env::set_var("VDIR_CERTMAN_INTERVAL_SECS", "0");
        assert!(CertManConfig::from_env().is_err());

        std::env::set_var("VDIR_CERTMAN_INTERVAL_SECS", "soon");
        assert!(CertManConfig::from_env().is_err());
        std::env::remove_var("VDIR_CERTMAN_INTERVAL_SECS");
    }

    #[test]
    fn configured_storage_is_created() {
        let root = tempfile::tempdir().unwrap();
        let config = CertManConfig {
            storage: Some(root.path().join("nested").join("certs")),
            ..CertManConfig::default()
        };
        let dir = config.storage_dir().unwrap();
        assert!(dir.is_dir());
    }
}
