//! # vdir-api binary
//!
//! Starts the directory service and the certificate manager.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use vdir_api::config::ApiConfig;
use vdir_api::state::AppState;
use vdir_ca_client::{CertAuthority, HttpCertAuthority, MockCertAuthority, SectigoConfig};
use vdir_certman::{CertManConfig, CertManager};
use vdir_crypto::SecretBox;
use vdir_email::{build_mailer, EmailConfig, Notifier};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cert_authority() -> anyhow::Result<Arc<dyn CertAuthority>> {
    match SectigoConfig::from_env() {
        Ok(config) => {
            tracing::info!(url = %config.base_url, "using Sectigo certificate authority");
            Ok(Arc::new(HttpCertAuthority::new(config)?))
        }
        Err(e) => {
            tracing::warn!(error = %e, "CA not configured; certificate requests go to an in-memory mock");
            Ok(Arc::new(
                MockCertAuthority::new().with_authority(1, "TestNet", 100),
            ))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ApiConfig::from_env()?;
    tracing::info!(?config, "loaded configuration");

    let store = Arc::new(
        vdir_store::open(&config.database)
            .with_context(|| format!("opening store {}", config.database))?,
    );
    let secrets = Arc::new(SecretBox::new(&config.secret_key)?);

    let email = EmailConfig::from_env()?;
    let notifier = Notifier::new(build_mailer(&email)?, &email);

    let certman_config = CertManConfig::from_env()?;
    let certman = CertManager::from_config(
        &certman_config,
        Arc::clone(&store),
        cert_authority()?,
        Arc::clone(&secrets),
        notifier.clone(),
    )?;
    let certman = certman.start();

    let state = AppState::new(store, secrets, notifier, config.directory_id.clone())
        .context("registering metrics collectors")?
        .with_admin_token(config.admin_token.clone());
    let app = vdir_api::app(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "vdir-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    certman.stop().await;
    tracing::info!("vdir-api stopped");
    Ok(())
}
