//! Per-user cursor sequencing and the applied-op idempotency index.
//!
//! The cursor store owns two tightly-coupled pieces of state: the per-user
//! high-water mark that orders the change stream, and the
//! `(user, op_id) → cursor` index that makes pushes idempotent. They live
//! behind one trait because an applied-op record is only ever written
//! against a cursor the same store just issued.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use taskline_core::{Cursor, OpId, UserId};

use crate::error::{Error, Result};

/// Cursor sequencing and idempotency storage.
///
/// ## Invariants
///
/// - Cursors returned by [`CursorStore::advance`] are strictly increasing
///   within a user; concurrent calls for the same user are serialized.
/// - [`CursorStore::mark_applied`] only runs after a successful task
///   mutation and an `advance` for the same `(user, cursor)` pair.
/// - Applied-op records are never deleted.
///
/// A relational implementation backs this with `sync_cursors(user_id PK,
/// last_cursor)` and `sync_applied_ops(user_id, op_id) UNIQUE → cursor`; the
/// UNIQUE constraint is what keeps concurrent replays from double-applying.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Returns the user's current high-water mark; zero for unknown users.
    async fn cursor(&self, user: &UserId) -> Result<Cursor>;

    /// Atomically increments and returns the user's cursor.
    async fn advance(&self, user: &UserId) -> Result<Cursor>;

    /// Returns the cursor assigned when the op was first applied, if any.
    async fn was_applied(&self, user: &UserId, op_id: &OpId) -> Result<Option<Cursor>>;

    /// Records that the op was applied at the given cursor.
    ///
    /// Idempotent upsert; a later write for the same pair wins, though that
    /// path is unreachable while pushes hold the per-user lock.
    async fn mark_applied(&self, user: &UserId, op_id: &OpId, cursor: Cursor) -> Result<()>;
}

#[derive(Debug, Default)]
struct CursorState {
    cursors: HashMap<UserId, u64>,
    applied: HashMap<UserId, HashMap<OpId, Cursor>>,
}

/// In-memory cursor and idempotency store.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    state: RwLock<CursorState>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryCursorStore {
    /// Creates an empty in-memory cursor store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn cursor(&self, user: &UserId) -> Result<Cursor> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(Cursor::new(state.cursors.get(user).copied().unwrap_or(0)))
    }

    async fn advance(&self, user: &UserId) -> Result<Cursor> {
        let mut state = self.state.write().map_err(poison_err)?;
        let slot = state.cursors.entry(user.clone()).or_insert(0);
        *slot += 1;
        Ok(Cursor::new(*slot))
    }

    async fn was_applied(&self, user: &UserId, op_id: &OpId) -> Result<Option<Cursor>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .applied
            .get(user)
            .and_then(|ops| ops.get(op_id))
            .copied())
    }

    async fn mark_applied(&self, user: &UserId, op_id: &OpId, cursor: Cursor) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .applied
            .entry(user.clone())
            .or_default()
            .insert(op_id.clone(), cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("u1")
    }

    #[tokio::test]
    async fn unknown_user_starts_at_zero() -> Result<()> {
        let store = InMemoryCursorStore::new();
        assert_eq!(store.cursor(&user()).await?, Cursor::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn advance_is_strictly_increasing() -> Result<()> {
        let store = InMemoryCursorStore::new();
        let mut last = Cursor::ZERO;
        for _ in 0..50 {
            let next = store.advance(&user()).await?;
            assert!(next > last);
            last = next;
        }
        assert_eq!(store.cursor(&user()).await?, last);
        Ok(())
    }

    #[tokio::test]
    async fn users_do_not_share_sequences() -> Result<()> {
        let store = InMemoryCursorStore::new();
        store.advance(&UserId::new("a")).await?;
        store.advance(&UserId::new("a")).await?;
        assert_eq!(store.cursor(&UserId::new("b")).await?, Cursor::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn applied_ops_round_trip() -> Result<()> {
        let store = InMemoryCursorStore::new();
        let op = OpId::new("o1");
        assert_eq!(store.was_applied(&user(), &op).await?, None);
        let cursor = store.advance(&user()).await?;
        store.mark_applied(&user(), &op, cursor).await?;
        assert_eq!(store.was_applied(&user(), &op).await?, Some(cursor));
        Ok(())
    }
}
