//! # Directory Routes
//!
//! The public surface of the directory:
//!
//! | Method | Path | |
//! |--------|------|-|
//! | POST | `/v1/register` | create a registration and email its contacts |
//! | POST | `/v1/verify-email` | verify a contact token |
//! | GET | `/v1/lookup` | full record by `id` or `common_name` |
//! | POST | `/v1/search` | ids and common names by name and/or country |
//! | GET | `/v1/status` | verification and service status |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use vdir_core::{Certificate, Contacts, Vasp, VaspId};
use vdir_store::SearchQuery;

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::registry;
use crate::routes::run_blocking;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Registration of a new VASP.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Legal name of the organization.
    #[serde(default)]
    pub name: String,
    /// Travel-rule legal identity document, stored verbatim.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub entity: serde_json::Value,
    /// Technical, administrative, billing and legal contacts.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub contacts: Contacts,
    /// `host:port` the VASP serves on.
    #[serde(default)]
    pub endpoint: String,
    /// TLS common name. Derived from `endpoint` when empty.
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub website: String,
    pub business_category: Option<String>,
    #[serde(default)]
    pub vasp_categories: Vec<String>,
    /// ISO 3166 alpha-2 country of registration.
    #[serde(default)]
    pub country: String,
    pub established_on: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), String> {
        if self.common_name.trim().is_empty() && self.endpoint.trim().is_empty() {
            return Err("common_name or endpoint is required".into());
        }
        Ok(())
    }
}

impl RegisterRequest {
    fn into_vasp(self) -> Vasp {
        let mut vasp = Vasp::new(self.name, self.common_name, self.country);
        vasp.entity = self.entity;
        vasp.contacts = self.contacts;
        vasp.endpoint = self.endpoint;
        vasp.website = self.website;
        vasp.business_category = self.business_category;
        vasp.categories = self.vasp_categories;
        vasp.established_on = self.established_on;
        vasp
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterReply {
    pub id: u64,
    pub registered_directory: String,
    pub common_name: String,
    pub status: String,
    pub message: String,
}

/// Contact verification.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub id: u64,
    pub token: String,
}

impl Validate for VerifyEmailRequest {
    fn validate(&self) -> Result<(), String> {
        if self.id == 0 {
            return Err("id is required".into());
        }
        if self.token.trim().is_empty() {
            return Err("token is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyEmailReply {
    pub status: String,
    pub message: String,
    /// Returned once, on the first verified contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkcs12_password: Option<String>,
}

/// Selects a VASP by id or, when no id is given, by common name.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordQuery {
    pub id: Option<String>,
    pub common_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LookupReply {
    pub id: u64,
    pub registered_directory: String,
    pub common_name: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub certificate: Option<Certificate>,
    pub name: String,
    pub country: String,
    pub verified_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Names to match; a trailing `*` matches by prefix.
    #[serde(default)]
    pub name: Vec<String>,
    /// ISO 3166 alpha-2 country codes.
    #[serde(default)]
    pub country: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub id: u64,
    pub registered_directory: String,
    pub common_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchReply {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusReply {
    pub verification_status: String,
    pub service_status: String,
    pub verified_on: Option<DateTime<Utc>>,
    pub first_listed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/register", post(register))
        .route("/v1/verify-email", post(verify_email))
        .route("/v1/lookup", get(lookup))
        .route("/v1/search", post(search))
        .route("/v1/status", get(status))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve(state: &AppState, query: &RecordQuery) -> Result<Vasp, AppError> {
    let id = query.id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let common_name = query
        .common_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (id, common_name) {
        (Some(id), _) => Ok(state.store.retrieve_vasp(id.parse::<VaspId>()?)?),
        (None, Some(common_name)) => Ok(state.store.lookup_common_name(common_name)?),
        (None, None) => Err(AppError::BadRequest("no lookup query provided".into())),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/register
#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration created; verification emails sent", body = RegisterReply),
        (status = 409, description = "Name or common name already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Incomplete registration", body = crate::error::ErrorBody),
    ),
    tag = "directory"
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterReply>), AppError> {
    let req = extract_validated_json(body)?;
    let vasp = run_blocking(&state, move |s| registry::register(s, req.into_vasp())).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterReply {
            id: vasp.id.get(),
            registered_directory: vasp.registered_directory,
            common_name: vasp.common_name,
            status: vasp.verification_status.to_string(),
            message: "verification code sent to contact emails, please check spam folder if not arrived"
                .into(),
        }),
    ))
}

/// POST /v1/verify-email
#[utoipa::path(
    post,
    path = "/v1/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Contact verified", body = VerifyEmailReply),
        (status = 404, description = "Unknown VASP or token", body = crate::error::ErrorBody),
    ),
    tag = "directory"
)]
pub(crate) async fn verify_email(
    State(state): State<AppState>,
    body: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<Json<VerifyEmailReply>, AppError> {
    let req = extract_validated_json(body)?;
    let outcome = run_blocking(&state, move |s| {
        registry::verify_email(s, VaspId(req.id), req.token.trim())
    })
    .await?;

    let message = if outcome.pkcs12_password.is_some() {
        "email successfully verified and verification review sent to directory admins; \
         pkcs12 password to decrypt your emailed certificates attached - do not lose!"
    } else {
        "email successfully verified; verification review already sent to directory admins"
    };
    Ok(Json(VerifyEmailReply {
        status: outcome.vasp.verification_status.to_string(),
        message: message.into(),
        pkcs12_password: outcome.pkcs12_password,
    }))
}

/// GET /v1/lookup
#[utoipa::path(
    get,
    path = "/v1/lookup",
    params(RecordQuery),
    responses(
        (status = 200, description = "VASP record", body = LookupReply),
        (status = 400, description = "Neither id nor common_name given", body = crate::error::ErrorBody),
        (status = 404, description = "No such VASP", body = crate::error::ErrorBody),
    ),
    tag = "directory"
)]
pub(crate) async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<LookupReply>, AppError> {
    let vasp = run_blocking(&state, move |s| resolve(s, &query)).await?;
    tracing::info!(vasp_id = %vasp.id, "VASP lookup succeeded");
    Ok(Json(LookupReply {
        id: vasp.id.get(),
        registered_directory: vasp.registered_directory,
        common_name: vasp.common_name,
        endpoint: vasp.endpoint,
        certificate: vasp.certificate,
        name: vasp.name,
        country: vasp.country,
        verified_on: vasp.verified_on,
    }))
}

/// POST /v1/search
#[utoipa::path(
    post,
    path = "/v1/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Matching VASPs", body = SearchReply),
        (status = 400, description = "No search criteria", body = crate::error::ErrorBody),
    ),
    tag = "directory"
)]
pub(crate) async fn search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchReply>, AppError> {
    let req = extract_json(body)?;
    let query = SearchQuery {
        names: req.name,
        countries: req.country,
    };
    let vasps = {
        let query = query.clone();
        run_blocking(&state, move |s| Ok(s.store.search(&query)?)).await?
    };
    tracing::info!(
        names = ?query.names,
        countries = ?query.countries,
        results = vasps.len(),
        "search succeeded"
    );

    Ok(Json(SearchReply {
        results: vasps
            .into_iter()
            .map(|v| SearchResult {
                id: v.id.get(),
                registered_directory: v.registered_directory,
                common_name: v.common_name,
            })
            .collect(),
    }))
}

/// GET /v1/status
#[utoipa::path(
    get,
    path = "/v1/status",
    params(RecordQuery),
    responses(
        (status = 200, description = "Verification and service status", body = StatusReply),
        (status = 400, description = "Neither id nor common_name given", body = crate::error::ErrorBody),
        (status = 404, description = "No such VASP", body = crate::error::ErrorBody),
    ),
    tag = "directory"
)]
pub(crate) async fn status(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<StatusReply>, AppError> {
    let vasp = run_blocking(&state, move |s| resolve(s, &query)).await?;
    Ok(Json(StatusReply {
        verification_status: vasp.verification_status.to_string(),
        service_status: vasp.service_status.to_string(),
        verified_on: vasp.verified_on,
        first_listed: vasp.first_listed,
        last_updated: vasp.last_updated,
    }))
}
