//! The append-only per-user change log.
//!
//! Every accepted mutation appends exactly one entry, keyed by the cursor
//! assigned at apply time. Pull pages through the log in ascending cursor
//! order; two consecutive pages chained through the returned cursor
//! partition the stream disjointly.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use taskline_core::{Cursor, TaskId, UserId};

use crate::error::{Error, Result};
use crate::operation::OpKind;
use crate::task::TaskSnapshot;

/// One committed mutation in a user's change stream.
///
/// Entries hold deep copies: the embedded snapshot must never alias the
/// task store's live state, because the log retains entries indefinitely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Position of this entry in the user's stream.
    pub cursor: Cursor,
    /// The task the mutation targeted.
    pub entity_id: TaskId,
    /// The mutation kind that produced the entry.
    pub operation: OpKind,
    /// True for soft-delete entries, which carry no snapshot.
    pub deleted: bool,
    /// Post-mutation task state including linked attachment IDs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TaskSnapshot>,
}

/// Append-only per-user ordered change storage.
///
/// A relational implementation backs this with `sync_change_log(user_id,
/// cursor, entity_id, operation, deleted, snapshot)` indexed by
/// `(user_id, cursor)`.
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Appends an entry; the caller guarantees strictly increasing cursors
    /// per user.
    async fn append(&self, user: &UserId, entry: ChangeEntry) -> Result<()>;

    /// Returns up to `limit` entries with cursor strictly greater than
    /// `after`, ascending, together with the cursor to resume from.
    ///
    /// The returned cursor is the last entry's cursor, or `after` when the
    /// window is empty.
    async fn entries_after(
        &self,
        user: &UserId,
        after: Cursor,
        limit: usize,
    ) -> Result<(Vec<ChangeEntry>, Cursor)>;
}

/// In-memory change log.
#[derive(Debug, Default)]
pub struct InMemoryChangeLog {
    entries: RwLock<HashMap<UserId, Vec<ChangeEntry>>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryChangeLog {
    /// Creates an empty in-memory change log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries recorded for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn entry_count(&self, user: &UserId) -> Result<usize> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.get(user).map_or(0, Vec::len))
    }
}

#[async_trait]
impl ChangeLog for InMemoryChangeLog {
    async fn append(&self, user: &UserId, entry: ChangeEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let log = entries.entry(user.clone()).or_default();
        debug_assert!(log.last().is_none_or(|last| last.cursor < entry.cursor));
        log.push(entry);
        Ok(())
    }

    async fn entries_after(
        &self,
        user: &UserId,
        after: Cursor,
        limit: usize,
    ) -> Result<(Vec<ChangeEntry>, Cursor)> {
        let entries = self.entries.read().map_err(poison_err)?;
        let window: Vec<ChangeEntry> = entries
            .get(user)
            .map(|log| {
                // Appends keep cursors ascending, so a filtered scan returns
                // an ordered window.
                log.iter()
                    .filter(|e| e.cursor > after)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let next = window.last().map_or(after, |e| e.cursor);
        Ok((window, next))
    }
}
