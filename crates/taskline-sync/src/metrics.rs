//! Sync engine metrics.
//!
//! Domain counters for push/pull outcomes and dead-letter transitions.
//! Request-level duration histograms live in the API crate's middleware;
//! these complement the structured logging already in place.

use metrics::{counter, describe_counter};

/// Operations applied by push.
pub const SYNC_PUSH_APPLIED: &str = "taskline_sync_push_applied_total";

/// Conflicts reported by push.
pub const SYNC_PUSH_CONFLICTS: &str = "taskline_sync_push_conflicts_total";

/// Change entries served by pull.
pub const SYNC_PULL_CHANGES: &str = "taskline_sync_pull_changes_total";

/// Operations dead-lettered after exhausting the retry budget.
pub const SYNC_DEAD_LETTER: &str = "taskline_sync_dead_letter_total";

/// Registers all sync metric descriptions.
///
/// Call this once at application startup after initializing the metrics
/// recorder.
pub fn register_metrics() {
    describe_counter!(SYNC_PUSH_APPLIED, "Total operations applied by sync push");
    describe_counter!(SYNC_PUSH_CONFLICTS, "Total conflicts reported by sync push");
    describe_counter!(SYNC_PULL_CHANGES, "Total change entries served by sync pull");
    describe_counter!(
        SYNC_DEAD_LETTER,
        "Total operations dead-lettered after exhausting the retry budget"
    );
}

/// Records the outcome counts of one push batch.
pub fn record_push_outcome(applied: usize, conflicts: usize) {
    counter!(SYNC_PUSH_APPLIED).increment(applied as u64);
    counter!(SYNC_PUSH_CONFLICTS).increment(conflicts as u64);
}

/// Records the number of change entries served by one pull.
pub fn record_pull_changes(changes: usize) {
    counter!(SYNC_PULL_CHANGES).increment(changes as u64);
}

/// Records a dead-letter transition.
pub fn record_dead_letter() {
    counter!(SYNC_DEAD_LETTER).increment(1);
}
