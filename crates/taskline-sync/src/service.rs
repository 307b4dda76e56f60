//! The push/pull sync engine.
//!
//! [`SyncService`] applies push batches against the task store, advances the
//! per-user cursor, appends to the change log, runs the
//! optimistic-concurrency check, reconciles attachment sets, and serves pull
//! queries. It holds its collaborators behind `Arc`s and owns no storage
//! state of its own.
//!
//! ## Per-User Serialization
//!
//! Pushes for the same user are serialized through an async per-user mutex
//! held across the whole batch, so cursors appear in the change log in
//! strictly ascending order. Pulls are pure reads and run concurrently with
//! pushes; they may observe a prefix of the log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;

use taskline_core::observability::sync_span;
use taskline_core::{Cursor, FileId, OpId, TaskId, UserId};

use crate::attachments::AttachmentLinker;
use crate::changelog::{ChangeEntry, ChangeLog};
use crate::cursor_store::CursorStore;
use crate::error::{Error, Result};
use crate::failure::FailureTracker;
use crate::metrics::record_dead_letter;
use crate::operation::{OpKind, Operation};
use crate::task::{DEFAULT_STATUS, DEFAULT_TITLE, TaskSnapshot, TaskStore};

/// Default page size for pull.
pub const DEFAULT_PULL_LIMIT: usize = 200;

/// Maximum page size for pull.
pub const MAX_PULL_LIMIT: usize = 200;

/// A per-op failure reported inline in a push response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    /// The operation that failed.
    pub op_id: OpId,
    /// Human-readable failure description.
    pub error: String,
    /// Current authoritative snapshot, attached on version mismatches so
    /// the client can resolve without a separate fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<TaskSnapshot>,
}

/// The result of applying one push batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushOutcome {
    /// Op IDs that are durably applied (first-time or replayed).
    pub applied: Vec<OpId>,
    /// Per-op failures; never aborts the batch.
    pub conflicts: Vec<Conflict>,
    /// The user's high-water mark after the batch.
    pub new_cursor: Cursor,
}

/// The result of one pull query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullOutcome {
    /// Change entries after the requested cursor, ascending.
    pub changes: Vec<ChangeEntry>,
    /// Cursor to resume from on the next pull.
    pub next_cursor: Cursor,
}

/// Registry of per-user async locks serializing push batches.
#[derive(Debug, Default)]
struct UserLocks {
    inner: StdMutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user: &UserId) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .inner
                .lock()
                .map_err(|_| Error::storage("user lock registry poisoned"))?;
            Arc::clone(locks.entry(user.clone()).or_default())
        };
        Ok(lock.lock_owned().await)
    }
}

/// Applies push batches and serves pull queries for a single-user scope.
///
/// The change log, attachment linker, and failure tracker are optional
/// collaborators; the engine degrades gracefully when they are absent
/// (no pull stream, no attachment reconciliation, no dead-letter signal).
pub struct SyncService {
    tasks: Arc<dyn TaskStore>,
    cursors: Arc<dyn CursorStore>,
    change_log: Option<Arc<dyn ChangeLog>>,
    attachments: Option<Arc<dyn AttachmentLinker>>,
    failures: Option<Arc<dyn FailureTracker>>,
    locks: UserLocks,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("tasks", &"<TaskStore>")
            .field("cursors", &"<CursorStore>")
            .field("change_log", &self.change_log.is_some())
            .field("attachments", &self.attachments.is_some())
            .field("failures", &self.failures.is_some())
            .finish()
    }
}

impl SyncService {
    /// Creates a service over the two mandatory collaborators.
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskStore>, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            tasks,
            cursors,
            change_log: None,
            attachments: None,
            failures: None,
            locks: UserLocks::default(),
        }
    }

    /// Creates a service wired to fresh in-memory implementations of every
    /// collaborator (for tests and single-node deployments).
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::task::InMemoryTaskStore::new()),
            Arc::new(crate::cursor_store::InMemoryCursorStore::new()),
        )
        .with_change_log(Arc::new(crate::changelog::InMemoryChangeLog::new()))
        .with_attachments(Arc::new(crate::attachments::InMemoryAttachmentLinker::new()))
        .with_failure_tracker(Arc::new(crate::failure::InMemoryFailureTracker::new()))
    }

    /// Attaches a change log, enabling the pull stream.
    #[must_use]
    pub fn with_change_log(mut self, change_log: Arc<dyn ChangeLog>) -> Self {
        self.change_log = Some(change_log);
        self
    }

    /// Attaches an attachment linker, enabling `attachment_ids`
    /// reconciliation.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentLinker>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Attaches a failure tracker, enabling the dead-letter signal.
    #[must_use]
    pub fn with_failure_tracker(mut self, failures: Arc<dyn FailureTracker>) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Applies a batch of operations for the user, in order.
    ///
    /// Idempotent by `op_id`: a replayed operation is acknowledged without
    /// touching the task store, the cursor, or the change log. Per-op
    /// failures surface as [`Conflict`]s and never abort the batch; a later
    /// op observes the state produced by earlier ones.
    ///
    /// If the caller's future is dropped between ops (request cancellation),
    /// already-applied ops stay applied and a retried push converges to the
    /// same state.
    ///
    /// # Errors
    ///
    /// Only cursor-store failures escape as an error; everything else is a
    /// conflict.
    pub async fn push(&self, user: &UserId, operations: Vec<Operation>) -> Result<PushOutcome> {
        let span = sync_span("push", user.as_str());
        async {
            let _guard = self.locks.acquire(user).await?;
            self.push_serialized(user, operations).await
        }
        .instrument(span)
        .await
    }

    async fn push_serialized(
        &self,
        user: &UserId,
        operations: Vec<Operation>,
    ) -> Result<PushOutcome> {
        let mut applied = Vec::new();
        let mut conflicts = Vec::new();

        for op in operations {
            if op.op_id.is_empty() {
                continue;
            }
            if self.cursors.was_applied(user, &op.op_id).await?.is_some() {
                applied.push(op.op_id);
                continue;
            }
            let Some(kind) = OpKind::parse(&op.kind) else {
                tracing::debug!(op = %op.op_id, kind = %op.kind, "dropping operation of unknown kind");
                continue;
            };

            let outcome = match kind {
                OpKind::Create => self.apply_create(user, &op).await,
                OpKind::Update => self.apply_update(user, &op).await,
                OpKind::Delete => self.tasks.soft_delete(&op.entity_id, user).await,
            };

            match outcome {
                Ok(()) => {
                    let cursor = self.cursors.advance(user).await?;
                    self.cursors.mark_applied(user, &op.op_id, cursor).await?;
                    applied.push(op.op_id.clone());
                    self.append_change(user, kind, &op.entity_id, cursor).await;
                }
                Err(err) => {
                    self.note_failure(user, &op.op_id).await;
                    let latest = if err.is_version_mismatch() {
                        self.tasks.get(&op.entity_id, user).await.ok()
                    } else {
                        None
                    };
                    conflicts.push(Conflict {
                        op_id: op.op_id,
                        error: err.to_string(),
                        latest,
                    });
                }
            }
        }

        // Read once at the end; replayed ops never advance it.
        let new_cursor = self.cursors.cursor(user).await?;
        Ok(PushOutcome {
            applied,
            conflicts,
            new_cursor,
        })
    }

    /// Returns change entries after the given cursor for the user.
    ///
    /// A pure read: never advances the server cursor, never mutates state.
    /// `limit` values outside `1..=MAX_PULL_LIMIT` resolve to the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the change log cannot be read.
    pub async fn pull(&self, user: &UserId, cursor: Cursor, limit: i64) -> Result<PullOutcome> {
        let span = sync_span("pull", user.as_str());
        async {
            let Some(log) = &self.change_log else {
                return Ok(PullOutcome {
                    changes: Vec::new(),
                    next_cursor: cursor,
                });
            };
            let limit = usize::try_from(limit)
                .ok()
                .filter(|l| (1..=MAX_PULL_LIMIT).contains(l))
                .unwrap_or(DEFAULT_PULL_LIMIT);
            let (changes, next_cursor) = log.entries_after(user, cursor, limit).await?;
            Ok(PullOutcome {
                changes,
                next_cursor,
            })
        }
        .instrument(span)
        .await
    }

    async fn apply_create(&self, user: &UserId, op: &Operation) -> Result<()> {
        let payload = op.payload.as_ref();
        let title = payload
            .and_then(|p| p.string("title"))
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let status = payload
            .and_then(|p| p.string("status"))
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STATUS);
        let due_at = payload.and_then(|p| p.timestamp("due_at"));

        self.tasks
            .create(user, &op.entity_id, title, status, due_at)
            .await?;

        // Best effort: a failed link never fails the create.
        if let (Some(linker), Some(files)) = (
            &self.attachments,
            payload.and_then(|p| p.string_list("attachment_ids")),
        ) {
            for file in files {
                let file = FileId::new(file);
                if let Err(err) = linker.link_to_task(&file, &op.entity_id, user).await {
                    tracing::warn!(task = %op.entity_id, file = %file, error = %err, "attachment link failed");
                }
            }
        }
        Ok(())
    }

    async fn apply_update(&self, user: &UserId, op: &Operation) -> Result<()> {
        let mut current = self.tasks.get(&op.entity_id, user).await?;
        if op.base_version > 0 && current.version != op.base_version {
            return Err(Error::VersionMismatch);
        }

        // An explicit attachment_ids key, even an empty list, replaces the
        // linked set wholesale.
        if let (Some(linker), Some(desired)) = (
            &self.attachments,
            op.payload.as_ref().and_then(|p| p.string_list("attachment_ids")),
        ) {
            let desired: Vec<FileId> = desired.into_iter().map(FileId::new).collect();
            let current_ids = linker.ids_by_task(&op.entity_id).await.unwrap_or_default();
            for file in current_ids.iter().filter(|f| !desired.contains(f)) {
                if let Err(err) = linker.unlink_from_task(file, user).await {
                    tracing::warn!(task = %op.entity_id, file = %file, error = %err, "attachment unlink failed");
                }
            }
            for file in desired.iter().filter(|f| !current_ids.contains(f)) {
                if let Err(err) = linker.link_to_task(file, &op.entity_id, user).await {
                    tracing::warn!(task = %op.entity_id, file = %file, error = %err, "attachment link failed");
                }
            }
        }

        if let Some(payload) = op.payload.as_ref() {
            // PATCH semantics: empty strings leave the field untouched.
            if let Some(title) = payload.string("title").filter(|s| !s.is_empty()) {
                current.title = title.to_string();
            }
            if let Some(status) = payload.string("status").filter(|s| !s.is_empty()) {
                current.status = status.to_string();
            }
            if let Some(due_at) = payload.timestamp("due_at") {
                current.due_at = Some(due_at);
            }
        }
        current.updated_at = Utc::now();
        current.version += 1;
        self.tasks.update(&current).await
    }

    /// Builds and appends the change entry for a just-applied op.
    ///
    /// Append failures are logged and swallowed: the mutation is already
    /// durable, and the change stream is a best-effort side channel.
    async fn append_change(&self, user: &UserId, kind: OpKind, entity_id: &TaskId, cursor: Cursor) {
        let Some(log) = &self.change_log else {
            return;
        };
        let mut entry = ChangeEntry {
            cursor,
            entity_id: entity_id.clone(),
            operation: kind,
            deleted: kind == OpKind::Delete,
            snapshot: None,
        };
        if kind != OpKind::Delete {
            if let Ok(mut snapshot) = self.tasks.get(entity_id, user).await {
                if let Some(linker) = &self.attachments {
                    if let Ok(ids) = linker.ids_by_task(entity_id).await {
                        snapshot.attachment_ids = ids;
                    }
                }
                entry.snapshot = Some(snapshot);
            }
        }
        if let Err(err) = log.append(user, entry).await {
            tracing::warn!(user = %user, cursor = %cursor, error = %err, "change log append failed; change invisible to pulls");
        }
    }

    async fn note_failure(&self, user: &UserId, op_id: &OpId) {
        let Some(tracker) = &self.failures else {
            return;
        };
        tracker.record_failure(user, op_id).await;
        if tracker.should_dead_letter(user, op_id).await {
            tracker.mark_dead_letter(user, op_id).await;
            record_dead_letter();
            tracing::warn!(user = %user, op = %op_id, "operation dead-lettered after exhausting retry budget");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::InMemoryChangeLog;
    use crate::cursor_store::InMemoryCursorStore;
    use crate::failure::InMemoryFailureTracker;
    use crate::payload::Payload;
    use crate::task::InMemoryTaskStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn create_op(op_id: &str, entity_id: &str, title: &str) -> Operation {
        Operation::new(op_id, entity_id, OpKind::Create)
            .with_payload(Payload::new().with("title", title))
    }

    #[tokio::test]
    async fn empty_op_ids_are_dropped_silently() -> Result<()> {
        let service = SyncService::in_memory();
        let outcome = service
            .push(&user(), vec![create_op("", "t1", "A")])
            .await?;
        assert!(outcome.applied.is_empty());
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.new_cursor, Cursor::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_kinds_are_dropped_silently() -> Result<()> {
        let service = SyncService::in_memory();
        let mut op = create_op("o1", "t1", "A");
        op.kind = "upsert".to_string();
        let outcome = service.push(&user(), vec![op]).await?;
        assert!(outcome.applied.is_empty());
        assert!(outcome.conflicts.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn later_ops_observe_earlier_ops_in_the_same_batch() -> Result<()> {
        let service = SyncService::in_memory();
        let update = Operation::new("o2", "t1", OpKind::Update)
            .with_base_version(1)
            .with_payload(Payload::new().with("status", "done"));
        let outcome = service
            .push(&user(), vec![create_op("o1", "t1", "A"), update])
            .await?;
        assert_eq!(outcome.applied.len(), 2);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.new_cursor, Cursor::new(2));
        Ok(())
    }

    #[tokio::test]
    async fn conflict_does_not_abort_later_ops() -> Result<()> {
        let service = SyncService::in_memory();
        let stale = Operation::new("o1", "missing", OpKind::Update);
        let outcome = service
            .push(&user(), vec![stale, create_op("o2", "t1", "A")])
            .await?;
        assert_eq!(outcome.applied, vec![OpId::new("o2")]);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.new_cursor, Cursor::new(1));
        Ok(())
    }

    #[tokio::test]
    async fn version_mismatch_carries_the_latest_snapshot() -> Result<()> {
        let service = SyncService::in_memory();
        service.push(&user(), vec![create_op("o1", "t1", "A")]).await?;

        let stale = Operation::new("o2", "t1", OpKind::Update)
            .with_base_version(99)
            .with_payload(Payload::new().with("title", "B"));
        let outcome = service.push(&user(), vec![stale]).await?;

        assert!(outcome.applied.is_empty());
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.error, "version mismatch");
        let latest = conflict.latest.as_ref().unwrap();
        assert_eq!(latest.title, "A");
        assert_eq!(latest.version, 1);
        assert_eq!(outcome.new_cursor, Cursor::new(1));
        Ok(())
    }

    #[tokio::test]
    async fn base_version_zero_skips_the_check() -> Result<()> {
        let service = SyncService::in_memory();
        service.push(&user(), vec![create_op("o1", "t1", "A")]).await?;
        let update = Operation::new("o2", "t1", OpKind::Update)
            .with_payload(Payload::new().with("title", "B"));
        let outcome = service.push(&user(), vec![update]).await?;
        assert_eq!(outcome.applied, vec![OpId::new("o2")]);
        Ok(())
    }

    #[tokio::test]
    async fn pull_without_change_log_echoes_the_cursor() -> Result<()> {
        let service = SyncService::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryCursorStore::new()),
        );
        let outcome = service.pull(&user(), Cursor::new(4), 10).await?;
        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.next_cursor, Cursor::new(4));
        Ok(())
    }

    #[tokio::test]
    async fn pull_clamps_the_limit() -> Result<()> {
        let service = SyncService::in_memory();
        for i in 0..3 {
            service
                .push(&user(), vec![create_op(&format!("o{i}"), &format!("t{i}"), "A")])
                .await?;
        }
        for limit in [0, -5, 1000] {
            let outcome = service.pull(&user(), Cursor::ZERO, limit).await?;
            assert_eq!(outcome.changes.len(), 3, "limit {limit} should clamp to default");
        }
        Ok(())
    }

    /// Tracker wrapper counting dead-letter transitions.
    struct CountingTracker {
        inner: InMemoryFailureTracker,
        marked: AtomicUsize,
    }

    #[async_trait]
    impl FailureTracker for CountingTracker {
        async fn record_failure(&self, user: &UserId, op_id: &OpId) {
            self.inner.record_failure(user, op_id).await;
        }

        async fn should_dead_letter(&self, user: &UserId, op_id: &OpId) -> bool {
            self.inner.should_dead_letter(user, op_id).await
        }

        async fn mark_dead_letter(&self, user: &UserId, op_id: &OpId) {
            self.marked.fetch_add(1, Ordering::SeqCst);
            self.inner.mark_dead_letter(user, op_id).await;
        }
    }

    #[tokio::test]
    async fn dead_letter_fires_exactly_once() -> Result<()> {
        let tracker = Arc::new(CountingTracker {
            inner: InMemoryFailureTracker::new(),
            marked: AtomicUsize::new(0),
        });
        let service = SyncService::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryCursorStore::new()),
        )
        .with_change_log(Arc::new(InMemoryChangeLog::new()))
        .with_failure_tracker(Arc::clone(&tracker) as Arc<dyn FailureTracker>);

        // Updating a task that does not exist fails every time.
        let doomed = Operation::new("o1", "ghost", OpKind::Update);
        for _ in 0..4 {
            let outcome = service.push(&user(), vec![doomed.clone()]).await?;
            assert_eq!(outcome.conflicts.len(), 1);
        }
        assert_eq!(tracker.marked.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
