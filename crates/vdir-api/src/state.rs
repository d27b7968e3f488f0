//! Shared application state handed to every handler.

use std::sync::Arc;

use vdir_crypto::SecretBox;
use vdir_email::Notifier;
use vdir_store::RecordStore;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;

/// Handles to the store, secret box and notifier.
///
/// Cloning is cheap; every clone shares the same store.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub secrets: Arc<SecretBox>,
    pub notifier: Notifier,
    /// Stamped on new registrations as `registered_directory`.
    pub directory_id: String,
    pub auth: AuthConfig,
    pub metrics: ApiMetrics,
}

impl AppState {
    /// State with admin authentication disabled.
    ///
    /// Fails only if the metrics collectors cannot be registered.
    pub fn new(
        store: Arc<RecordStore>,
        secrets: Arc<SecretBox>,
        notifier: Notifier,
        directory_id: impl Into<String>,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            store,
            secrets,
            notifier,
            directory_id: directory_id.into(),
            auth: AuthConfig::default(),
            metrics: ApiMetrics::new()?,
        })
    }

    /// Require `token` as the bearer token on admin routes.
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.auth = AuthConfig { token };
        self
    }
}
