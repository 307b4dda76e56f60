//! Sync API routes.
//!
//! The two symmetric halves of the device-reconciliation protocol:
//!
//! ## Routes
//!
//! - `POST /sync/push` - Apply a batch of client mutations
//! - `GET  /sync/pull` - Page through the change stream after a cursor
//!
//! ## Authentication
//!
//! Both endpoints require an authenticated user; the engine scopes every
//! store access by the user identifier from the request context.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use taskline_core::{Cursor, OpId, TaskId};
use taskline_sync::{ChangeEntry, Conflict, Operation, Payload, PullOutcome, PushOutcome, TaskSnapshot};

use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody};
use crate::extract::ApiJson;
use crate::metrics::{record_pull_duration, record_push_duration};
use crate::server::AppState;

// ============================================================================
// Request/Response Types (with ToSchema for OpenAPI)
// ============================================================================

/// Request body for `POST /sync/push`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PushRequest {
    /// Operations to apply in order. Null or absent is an empty batch.
    #[serde(default)]
    pub operations: Option<Vec<PushOperation>>,
}

/// One client mutation in a push batch.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PushOperation {
    /// Client-generated idempotency token; empty tokens are dropped.
    #[serde(default)]
    pub op_id: String,
    /// The task the operation targets.
    #[serde(default)]
    pub entity_id: String,
    /// Mutation kind: `create`, `update`, or `delete`. Unknown kinds are
    /// dropped silently.
    #[serde(default)]
    pub operation: String,
    /// Version the client last observed; `0` opts out of the check.
    #[serde(default)]
    pub base_version: i64,
    /// Optional field map (`title`, `status`, `due_at`, `attachment_ids`).
    /// `due_at` accepts RFC 3339 strings or numeric Unix milliseconds.
    #[serde(default)]
    pub payload: Option<serde_json::Map<String, Value>>,
}

impl From<PushOperation> for Operation {
    fn from(op: PushOperation) -> Self {
        Self {
            op_id: OpId::new(op.op_id),
            entity_id: TaskId::new(op.entity_id),
            kind: op.operation,
            base_version: op.base_version,
            payload: op.payload.map(Payload::from),
        }
    }
}

/// Response body for `POST /sync/push`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PushResponse {
    /// Op IDs that are durably applied (first-time or replayed).
    pub applied: Vec<String>,
    /// Per-op failures; the batch itself always succeeds.
    pub conflicts: Vec<ConflictBody>,
    /// The user's change-stream high-water mark after the batch.
    pub new_cursor: String,
}

impl From<PushOutcome> for PushResponse {
    fn from(outcome: PushOutcome) -> Self {
        Self {
            applied: outcome.applied.iter().map(ToString::to_string).collect(),
            conflicts: outcome.conflicts.into_iter().map(ConflictBody::from).collect(),
            new_cursor: outcome.new_cursor.to_string(),
        }
    }
}

/// A per-op failure reported inline in a push response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConflictBody {
    /// The operation that failed.
    pub op_id: String,
    /// Failure description; `version mismatch` marks the optimistic
    /// concurrency violation.
    pub error: String,
    /// Current authoritative state, attached on version mismatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<TaskSnapshotBody>,
}

impl From<Conflict> for ConflictBody {
    fn from(conflict: Conflict) -> Self {
        Self {
            op_id: conflict.op_id.to_string(),
            error: conflict.error,
            latest: conflict.latest.map(TaskSnapshotBody::from),
        }
    }
}

/// A task snapshot embedded in conflicts and change entries.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskSnapshotBody {
    /// Task identifier.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Task title.
    pub title: String,
    /// Task status.
    pub status: String,
    /// Optional due timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// Monotonic entity version.
    pub version: i64,
    /// Server wall clock at the last accepted mutation.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Attachment file IDs linked to the task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<String>,
}

impl From<TaskSnapshot> for TaskSnapshotBody {
    fn from(snapshot: TaskSnapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            user_id: snapshot.user_id.to_string(),
            title: snapshot.title,
            status: snapshot.status,
            due_at: snapshot.due_at,
            version: snapshot.version,
            updated_at: snapshot.updated_at,
            deleted_at: snapshot.deleted_at,
            attachment_ids: snapshot
                .attachment_ids
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// One committed mutation in a pull response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChangeBody {
    /// Position of this entry in the user's stream.
    pub cursor: String,
    /// The task the mutation targeted.
    pub entity_id: String,
    /// The mutation kind that produced the entry.
    pub operation: String,
    /// True for soft-delete entries.
    pub deleted: bool,
    /// Post-mutation task state, absent for deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TaskSnapshotBody>,
}

impl From<ChangeEntry> for ChangeBody {
    fn from(entry: ChangeEntry) -> Self {
        Self {
            cursor: entry.cursor.to_string(),
            entity_id: entry.entity_id.to_string(),
            operation: entry.operation.as_str().to_string(),
            deleted: entry.deleted,
            snapshot: entry.snapshot.map(TaskSnapshotBody::from),
        }
    }
}

/// Response body for `GET /sync/pull`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PullResponse {
    /// Change entries after the requested cursor, ascending.
    pub changes: Vec<ChangeBody>,
    /// Cursor to resume from on the next pull.
    pub next_cursor: String,
}

impl From<PullOutcome> for PullResponse {
    fn from(outcome: PullOutcome) -> Self {
        Self {
            changes: outcome.changes.into_iter().map(ChangeBody::from).collect(),
            next_cursor: outcome.next_cursor.to_string(),
        }
    }
}

/// Query parameters for `GET /sync/pull`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PullParams {
    /// Resume cursor; empty or absent starts from the beginning.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Page size; default and maximum 200.
    #[serde(default)]
    pub limit: Option<i64>,
}

// ============================================================================
// Routes
// ============================================================================

/// Creates sync routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/push", post(push))
        .route("/sync/pull", get(pull))
}

/// Apply a batch of client mutations.
///
/// POST /sync/push
#[utoipa::path(
    post,
    path = "/sync/push",
    tag = "sync",
    request_body = PushRequest,
    responses(
        (status = 200, description = "Batch processed; conflicts inline", body = PushResponse),
        (status = 400, description = "Undecodable body", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn push(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PushRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let operations: Vec<Operation> = req
        .operations
        .unwrap_or_default()
        .into_iter()
        .map(Operation::from)
        .collect();

    tracing::debug!(
        user = %ctx.user_id,
        request_id = %ctx.request_id,
        operations = operations.len(),
        "sync push"
    );

    let start = Instant::now();
    let outcome = state
        .sync
        .push(&ctx.user_id, operations)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    record_push_duration(start.elapsed().as_secs_f64());
    taskline_sync::metrics::record_push_outcome(outcome.applied.len(), outcome.conflicts.len());

    Ok(Json(PushResponse::from(outcome)))
}

/// Page through the change stream after a cursor.
///
/// GET /sync/pull
#[utoipa::path(
    get,
    path = "/sync/pull",
    tag = "sync",
    params(PullParams),
    responses(
        (status = 200, description = "Changes after the cursor", body = PullResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn pull(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PullParams>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = Cursor::parse_or_zero(params.cursor.as_deref().unwrap_or(""));
    let limit = params.limit.unwrap_or(0);

    let start = Instant::now();
    let outcome = state
        .sync
        .pull(&ctx.user_id, cursor, limit)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    record_pull_duration(start.elapsed().as_secs_f64());
    taskline_sync::metrics::record_pull_changes(outcome.changes.len());

    Ok(Json(PullResponse::from(outcome)))
}
