//! # Admin Routes
//!
//! `POST /v1/admin/review` accepts or rejects a registration that is
//! `PENDING_REVIEW`. The route sits behind the admin bearer token; the body
//! must also carry the per-VASP token from the review request email.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use vdir_core::VaspId;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::registry;
use crate::routes::run_blocking;
use crate::state::AppState;

/// Review decision for one registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub id: u64,
    /// Token from the review request email.
    pub admin_verification_token: String,
    pub accept: bool,
    /// Required when rejecting.
    #[serde(default)]
    pub reject_reason: String,
}

impl Validate for ReviewRequest {
    fn validate(&self) -> Result<(), String> {
        if self.id == 0 {
            return Err("id is required".into());
        }
        if self.admin_verification_token.trim().is_empty() {
            return Err("admin_verification_token is required".into());
        }
        if !self.accept && self.reject_reason.trim().is_empty() {
            return Err("reject_reason is required when rejecting a registration".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewReply {
    pub id: u64,
    pub status: String,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/admin/review", post(review))
}

/// POST /v1/admin/review
#[utoipa::path(
    post,
    path = "/v1/admin/review",
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Registration reviewed", body = ReviewReply),
        (status = 401, description = "Missing or invalid admin bearer token", body = crate::error::ErrorBody),
        (status = 403, description = "Admin verification token does not match", body = crate::error::ErrorBody),
        (status = 409, description = "Registration is not pending review", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub(crate) async fn review(
    State(state): State<AppState>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewReply>, AppError> {
    let req = extract_validated_json(body)?;
    let accept = req.accept;
    let vasp = run_blocking(&state, move |s| {
        registry::review(
            s,
            VaspId(req.id),
            req.admin_verification_token.trim(),
            req.accept,
            &req.reject_reason,
        )
    })
    .await?;

    let message = if accept {
        "registration accepted; certificate request released for issuance"
    } else {
        "registration rejected"
    };
    Ok(Json(ReviewReply {
        id: vasp.id.get(),
        status: vasp.verification_status.to_string(),
        message: message.into(),
    }))
}
