//! # vdir-api — VASP Directory Service
//!
//! Axum service in front of the record store. Organizations register,
//! verify their contacts by email, and are reviewed by an administrator;
//! the certificate manager picks up reviewed registrations from the store.
//!
//! ## API Surface
//!
//! | Path | Module | Auth |
//! |------|--------|------|
//! | `/v1/register`, `/v1/verify-email` | [`routes::directory`] | none |
//! | `/v1/lookup`, `/v1/search`, `/v1/status` | [`routes::directory`] | none |
//! | `/v1/admin/review` | [`routes::admin`] | admin bearer token |
//! | `/health/*`, `/metrics` | this module | none |
//! | `/openapi.json` | [`openapi`] | none |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → [AuthMiddleware, admin routes only] → Handler
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod registry;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use vdir_core::VaspId;
use vdir_store::StoreError;

use crate::error::AppError;
use crate::routes::run_blocking;
use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let admin = routes::admin::router().layer(from_fn(auth::auth_middleware));

    let api = Router::new()
        .merge(routes::directory::router())
        .merge(admin)
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state.auth.clone()))
        .layer(Extension(state.metrics.clone()))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

/// Ready when the store answers a point read.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.retrieve_vasp(VaspId(u64::MAX)) {
        Ok(_) | Err(StoreError::EntityNotFound { .. }) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

/// Prometheus text exposition, with directory gauges refreshed from the store.
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let text = run_blocking(&state, |s| {
        let vasps = s.store.list_vasps()?;
        let certreqs = s.store.list_cert_reqs()?;
        s.metrics.observe_directory(&vasps, &certreqs);
        s.metrics.gather_and_encode().map_err(AppError::Internal)
    })
    .await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], text))
}
