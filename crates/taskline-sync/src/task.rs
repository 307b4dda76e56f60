//! The task-store port and its in-memory implementation.
//!
//! The engine sees tasks through a narrower interface than the public CRUD
//! API: create with a client-chosen ID, read a snapshot, replace a snapshot,
//! soft-delete. Keeping the port minimal decouples the engine from task
//! field evolution.
//!
//! ## Snapshot Semantics
//!
//! [`TaskStore::get`] returns a by-value copy. The engine merges payload
//! fields into its local copy and hands the whole snapshot back through
//! [`TaskStore::update`]; the store never leaks aliases to live state.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskline_core::{FileId, TaskId, UserId};

use crate::error::{Error, Result};

/// Title applied when a create payload has none.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Status applied when a create payload has none.
pub const DEFAULT_STATUS: &str = "pending";

/// A by-value view of a task entity's state.
///
/// `version` starts at 1 and increases by one on every accepted mutation,
/// soft-delete included. A non-null `deleted_at` makes the task invisible
/// to reads. `attachment_ids` is populated from the attachment linker when
/// the snapshot is embedded in a change entry; the store itself does not
/// track attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Client-chosen task identifier, globally unique.
    pub id: TaskId,
    /// Owning user; ownership is immutable.
    pub user_id: UserId,
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
    /// Soft-delete marker; set means logically removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Attachment file IDs currently linked to the task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<FileId>,
}

/// Storage port for task entities, as seen by the sync engine.
///
/// All methods are user-scoped: a task owned by another user is
/// indistinguishable from a missing one.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new task at version 1 with the given fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskExists`] when the ID is already taken, including
    /// by a soft-deleted row — deleted IDs are never resurrected.
    async fn create(
        &self,
        user: &UserId,
        task_id: &TaskId,
        title: &str,
        status: &str,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<TaskSnapshot>;

    /// Returns a copy of the task's current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] when the task is missing,
    /// soft-deleted, or owned by a different user.
    async fn get(&self, task_id: &TaskId, user: &UserId) -> Result<TaskSnapshot>;

    /// Replaces the stored row with the given snapshot.
    ///
    /// The caller has already bumped `version` and stamped `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] when the row is missing, soft-deleted,
    /// or owned by a different user.
    async fn update(&self, snapshot: &TaskSnapshot) -> Result<()>;

    /// Marks the task deleted, bumping its version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] when the row is missing, already
    /// deleted, or owned by a different user.
    async fn soft_delete(&self, task_id: &TaskId, user: &UserId) -> Result<()>;
}

/// In-memory task store.
///
/// Thread-safe via a single `RwLock`; suitable for tests and single-node
/// deployments. A relational implementation slots in behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TaskSnapshot>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryTaskStore {
    /// Creates an empty in-memory task store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(
        &self,
        user: &UserId,
        task_id: &TaskId,
        title: &str,
        status: &str,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<TaskSnapshot> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        if tasks.contains_key(task_id) {
            return Err(Error::TaskExists {
                task_id: task_id.clone(),
            });
        }
        let snapshot = TaskSnapshot {
            id: task_id.clone(),
            user_id: user.clone(),
            title: title.to_string(),
            status: status.to_string(),
            due_at,
            version: 1,
            updated_at: Utc::now(),
            deleted_at: None,
            attachment_ids: Vec::new(),
        };
        tasks.insert(task_id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn get(&self, task_id: &TaskId, user: &UserId) -> Result<TaskSnapshot> {
        let tasks = self.tasks.read().map_err(poison_err)?;
        tasks
            .get(task_id)
            .filter(|t| t.deleted_at.is_none() && &t.user_id == user)
            .cloned()
            .ok_or_else(|| Error::task_not_found(task_id))
    }

    async fn update(&self, snapshot: &TaskSnapshot) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        let existing = tasks
            .get(&snapshot.id)
            .filter(|t| t.deleted_at.is_none() && t.user_id == snapshot.user_id)
            .ok_or_else(|| Error::task_not_found(&snapshot.id))?;
        debug_assert!(snapshot.version > existing.version);
        tasks.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn soft_delete(&self, task_id: &TaskId, user: &UserId) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        let task = tasks
            .get_mut(task_id)
            .filter(|t| t.deleted_at.is_none() && &t.user_id == user)
            .ok_or_else(|| Error::task_not_found(task_id))?;
        let now = Utc::now();
        task.deleted_at = Some(now);
        task.updated_at = now;
        task.version += 1;
        Ok(())
    }
}
