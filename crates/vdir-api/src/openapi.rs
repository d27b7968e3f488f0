//! OpenAPI document for the directory, served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Admin token. Set via VDIR_ADMIN_TOKEN."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "VASP Directory Service",
        description = "Registration, verification, lookup and search for the VASP trust directory.\n\nOnly `/v1/admin/*` requires the admin bearer token."
    ),
    paths(
        crate::routes::directory::register,
        crate::routes::directory::verify_email,
        crate::routes::directory::lookup,
        crate::routes::directory::search,
        crate::routes::directory::status,
        crate::routes::admin::review,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::directory::RegisterRequest,
        crate::routes::directory::RegisterReply,
        crate::routes::directory::VerifyEmailRequest,
        crate::routes::directory::VerifyEmailReply,
        crate::routes::directory::LookupReply,
        crate::routes::directory::SearchRequest,
        crate::routes::directory::SearchResult,
        crate::routes::directory::SearchReply,
        crate::routes::directory::StatusReply,
        crate::routes::admin::ReviewRequest,
        crate::routes::admin::ReviewReply,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "directory", description = "Public directory operations"),
        (name = "admin", description = "Registration review"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}
