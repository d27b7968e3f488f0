//! # API Route Modules
//!
//! - `directory`: public registration, verification, lookup, search and
//!   status endpoints.
//! - `admin`: registration review, behind the admin bearer token.

pub mod admin;
pub mod directory;

use crate::error::AppError;
use crate::state::AppState;

/// Run a blocking workflow off the async runtime.
pub(crate) async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&AppState) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}
