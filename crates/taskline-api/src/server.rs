//! API server implementation.
//!
//! Provides health, ready, metrics, and sync endpoints for the Taskline
//! backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use taskline_core::{Result, UserId};
use taskline_sync::{
    CursorStore, InMemoryAttachmentLinker, InMemoryChangeLog, InMemoryCursorStore,
    InMemoryFailureTracker, InMemoryTaskStore, SyncService,
};

use crate::config::{Config, CorsConfig};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The sync engine.
    pub sync: Arc<SyncService>,
    /// Cursor store handle used by the readiness probe.
    cursors: Arc<dyn CursorStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("sync", &self.sync)
            .field("cursors", &"<CursorStore>")
            .finish()
    }
}

impl AppState {
    /// Creates application state around an existing engine.
    #[must_use]
    pub fn new(config: Config, sync: Arc<SyncService>, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            config,
            sync,
            cursors,
        }
    }

    /// Creates application state with in-memory stores wired from config.
    #[must_use]
    pub fn with_memory_stores(config: Config) -> Self {
        let cursors: Arc<dyn CursorStore> = Arc::new(InMemoryCursorStore::new());
        let sync = SyncService::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::clone(&cursors),
        )
        .with_change_log(Arc::new(InMemoryChangeLog::new()))
        .with_attachments(Arc::new(InMemoryAttachmentLinker::new()))
        .with_failure_tracker(Arc::new(InMemoryFailureTracker::with_budget(
            config.retry_budget,
        )));
        Self::new(config, Arc::new(sync), cursors)
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// Returns 200 OK if the service is alive. This is a shallow check that
/// doesn't verify dependencies.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
///
/// Returns 200 OK if the service is ready to accept requests. Probes the
/// cursor store, since a push cannot complete without it.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let probe = UserId::new("__taskline/ready-check");
    match state.cursors.cursor(&probe).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!("cursor store check failed: {e}")),
            }),
        ),
    }
}

/// OpenAPI document endpoint handler.
async fn openapi_json() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// Server
// ============================================================================

/// The Taskline API server.
pub struct Server {
    config: Config,
    state: Arc<AppState>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish()
    }
}

impl Server {
    /// Creates a new server with in-memory stores.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let state = Arc::new(AppState::with_memory_stores(config.clone()));
        Self { config, state }
    }

    /// Creates a new server around an existing engine and cursor store.
    #[must_use]
    pub fn with_service(
        config: Config,
        sync: Arc<SyncService>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        let state = Arc::new(AppState::new(config.clone(), sync, cursors));
        Self { config, state }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the router with all routes and middleware.
    fn create_router(&self) -> Router {
        let state = Arc::clone(&self.state);

        let cors = self.build_cors_layer();
        let auth_layer =
            middleware::from_fn_with_state(Arc::clone(&state), crate::context::auth_middleware);
        let metrics_layer = middleware::from_fn(crate::metrics::metrics_middleware);

        Router::new()
            // Health, ready, metrics, and OpenAPI endpoints (no auth required)
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(crate::metrics::serve_metrics))
            .route("/openapi.json", get(openapi_json))
            // Sync routes (auth via RequestContext extractor)
            .merge(crate::routes::sync_routes().layer(auth_layer))
            // Middleware (order matters): Metrics outermost for timing,
            // then trace, then CORS.
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer)
            .with_state(state)
    }

    /// Builds the CORS layer from configuration.
    fn build_cors_layer(&self) -> CorsLayer {
        let cors_config = &self.config.cors;
        let cors = Self::build_cors_base(cors_config);
        Self::apply_cors_allowed_origins(cors, cors_config)
    }

    fn build_cors_base(cors_config: &CorsConfig) -> CorsLayer {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("x-user-id"),
                header::HeaderName::from_static("x-request-id"),
            ])
            .expose_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::HeaderName::from_static("x-request-id"),
            ])
            .max_age(Duration::from_secs(cors_config.max_age_seconds))
    }

    fn apply_cors_allowed_origins(cors: CorsLayer, cors_config: &CorsConfig) -> CorsLayer {
        if cors_config.allowed_origins.is_empty() {
            return cors;
        }

        if cors_config.allowed_origins.len() == 1
            && cors_config.allowed_origins[0] == "*"
        {
            return cors.allow_origin(Any);
        }

        if cors_config.allowed_origins.iter().any(|origin| origin == "*") {
            tracing::error!(
                origins = ?cors_config.allowed_origins,
                "Invalid CORS config: '*' must be the only allowed origin"
            );
            return cors;
        }

        let allowed: Vec<HeaderValue> = cors_config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::error!(origin = %origin, "Invalid CORS origin");
                    None
                }
            })
            .collect();

        if allowed.is_empty() {
            tracing::warn!("All configured CORS origins were invalid; disabling CORS");
            cors
        } else {
            tracing::info!(origins = ?cors_config.allowed_origins, "CORS configured");
            cors.allow_origin(AllowOrigin::list(allowed))
        }
    }

    /// Starts the server and blocks until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server
    /// cannot bind to the port.
    pub async fn serve(&self) -> Result<()> {
        self.config.validate()?;

        // Initialize metrics before starting the server
        crate::metrics::init_metrics();
        taskline_sync::metrics::register_metrics();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = self.create_router();

        tracing::info!(http_port = self.config.http_port, "Starting Taskline API server");

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            taskline_core::Error::Internal {
                message: format!("failed to bind to {addr}: {e}"),
            }
        })?;

        axum::serve(listener, router)
            .await
            .map_err(|e| taskline_core::Error::Internal {
                message: format!("server error: {e}"),
            })?;

        Ok(())
    }

    /// Creates a test router for the server.
    ///
    /// This is useful for integration tests where you want to exercise the
    /// routes without binding to a port.
    #[doc(hidden)]
    pub fn test_router(&self) -> Router {
        self.create_router()
    }
}
