//! `OpenAPI` (3.1) specification generation for `taskline-api`.
//!
//! Served at `/openapi.json`; used to generate device clients and to detect
//! breaking API changes in CI.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// `OpenAPI` documentation for the Taskline sync API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskline API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Taskline multi-device sync API"
    ),
    paths(
        crate::routes::sync::push,
        crate::routes::sync::pull,
    ),
    components(schemas(
        crate::routes::sync::PushRequest,
        crate::routes::sync::PushOperation,
        crate::routes::sync::PushResponse,
        crate::routes::sync::ConflictBody,
        crate::routes::sync::TaskSnapshotBody,
        crate::routes::sync::ChangeBody,
        crate::routes::sync::PullResponse,
        crate::error::ApiErrorBody,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "sync", description = "Device synchronization endpoints")
    )
)]
pub struct ApiDoc;

/// Registers the bearer authentication scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_contains_sync_paths() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/sync/push"));
        assert!(json.contains("/sync/pull"));
        assert!(json.contains("bearerAuth"));
    }
}
