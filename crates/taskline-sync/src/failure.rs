//! Per-operation failure accounting and dead-letter flagging.
//!
//! The tracker observes failures of not-yet-applied operations; it never
//! prevents the engine from retrying. Once an op's failure count reaches
//! the retry budget it transitions to dead-lettered exactly once, which the
//! engine surfaces as a metric. Quarantining the op is left to an external
//! policy layer.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use taskline_core::{OpId, UserId};

/// Default retry budget before an op is dead-lettered.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Failure counting per `(user, op_id)`.
#[async_trait]
pub trait FailureTracker: Send + Sync {
    /// Increments the failure count for the op.
    async fn record_failure(&self, user: &UserId, op_id: &OpId);

    /// Returns true iff the count has reached the budget and the op is not
    /// yet flagged.
    async fn should_dead_letter(&self, user: &UserId, op_id: &OpId) -> bool;

    /// Flags the op as dead-lettered. Idempotent; subsequent
    /// [`FailureTracker::should_dead_letter`] calls return false.
    async fn mark_dead_letter(&self, user: &UserId, op_id: &OpId);
}

#[derive(Debug, Default, Clone, Copy)]
struct FailureRecord {
    count: u32,
    dead_lettered: bool,
}

/// In-memory failure tracker with a configurable retry budget.
#[derive(Debug)]
pub struct InMemoryFailureTracker {
    budget: u32,
    records: RwLock<HashMap<UserId, HashMap<OpId, FailureRecord>>>,
}

impl Default for InMemoryFailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFailureTracker {
    /// Creates a tracker with the default retry budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_RETRY_BUDGET)
    }

    /// Creates a tracker with the given retry budget (0 falls back to the
    /// default).
    #[must_use]
    pub fn with_budget(budget: u32) -> Self {
        Self {
            budget: if budget == 0 {
                DEFAULT_RETRY_BUDGET
            } else {
                budget
            },
            records: RwLock::new(HashMap::new()),
        }
    }
}

fn recover<T>(err: PoisonError<T>) -> T {
    // Failure accounting is advisory; a poisoned map is still usable.
    err.into_inner()
}

#[async_trait]
impl FailureTracker for InMemoryFailureTracker {
    async fn record_failure(&self, user: &UserId, op_id: &OpId) {
        let mut records = self.records.write().unwrap_or_else(recover);
        records
            .entry(user.clone())
            .or_default()
            .entry(op_id.clone())
            .or_default()
            .count += 1;
    }

    async fn should_dead_letter(&self, user: &UserId, op_id: &OpId) -> bool {
        let records = self.records.read().unwrap_or_else(recover);
        records
            .get(user)
            .and_then(|ops| ops.get(op_id))
            .is_some_and(|r| !r.dead_lettered && r.count >= self.budget)
    }

    async fn mark_dead_letter(&self, user: &UserId, op_id: &OpId) {
        let mut records = self.records.write().unwrap_or_else(recover);
        records
            .entry(user.clone())
            .or_default()
            .entry(op_id.clone())
            .or_default()
            .dead_lettered = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("u1")
    }

    #[tokio::test]
    async fn below_budget_is_not_dead_lettered() {
        let tracker = InMemoryFailureTracker::new();
        let op = OpId::new("o1");
        tracker.record_failure(&user(), &op).await;
        tracker.record_failure(&user(), &op).await;
        assert!(!tracker.should_dead_letter(&user(), &op).await);
    }

    #[tokio::test]
    async fn budget_reached_flags_exactly_once() {
        let tracker = InMemoryFailureTracker::new();
        let op = OpId::new("o1");
        for _ in 0..DEFAULT_RETRY_BUDGET {
            tracker.record_failure(&user(), &op).await;
        }
        assert!(tracker.should_dead_letter(&user(), &op).await);
        tracker.mark_dead_letter(&user(), &op).await;
        assert!(!tracker.should_dead_letter(&user(), &op).await);

        // Further failures do not re-arm the flag.
        tracker.record_failure(&user(), &op).await;
        assert!(!tracker.should_dead_letter(&user(), &op).await);
    }

    #[tokio::test]
    async fn counts_are_scoped_per_op() {
        let tracker = InMemoryFailureTracker::with_budget(1);
        tracker.record_failure(&user(), &OpId::new("o1")).await;
        assert!(tracker.should_dead_letter(&user(), &OpId::new("o1")).await);
        assert!(!tracker.should_dead_letter(&user(), &OpId::new("o2")).await);
    }

    #[tokio::test]
    async fn zero_budget_falls_back_to_default() {
        let tracker = InMemoryFailureTracker::with_budget(0);
        let op = OpId::new("o1");
        tracker.record_failure(&user(), &op).await;
        assert!(!tracker.should_dead_letter(&user(), &op).await);
    }
}
