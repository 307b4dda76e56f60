//! HTTP route handlers.

pub mod sync;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// `/sync` routes (authenticated).
pub fn sync_routes() -> Router<Arc<AppState>> {
    sync::routes()
}
