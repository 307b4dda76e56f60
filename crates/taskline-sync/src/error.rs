//! Error types for the sync domain.

use taskline_core::TaskId;

/// The result type used throughout taskline-sync.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while applying sync operations.
///
/// Per-operation failures are converted into inline conflicts by the
/// [`SyncService`](crate::service::SyncService); only cursor-store failures
/// escape a push as a whole-request error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The task does not exist, is soft-deleted, or belongs to another user.
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// The task ID that was looked up.
        task_id: TaskId,
    },

    /// A create targeted an ID that is already taken.
    #[error("task already exists: {task_id}")]
    TaskExists {
        /// The task ID that collided.
        task_id: TaskId,
    },

    /// The client's base version no longer matches the stored version.
    ///
    /// The conflict report for this error carries the current snapshot so
    /// the client can resolve without a separate fetch.
    #[error("version mismatch")]
    VersionMismatch,

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error from taskline-core.
    #[error("core error: {0}")]
    Core(#[from] taskline_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a not-found error for the given task.
    #[must_use]
    pub fn task_not_found(task_id: &TaskId) -> Self {
        Self::TaskNotFound {
            task_id: task_id.clone(),
        }
    }

    /// Returns true for the optimistic-concurrency violation.
    #[must_use]
    pub const fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_message_is_stable() {
        // Clients match on this string to trigger conflict resolution.
        assert_eq!(Error::VersionMismatch.to_string(), "version mismatch");
    }

    #[test]
    fn not_found_names_the_task() {
        let err = Error::task_not_found(&TaskId::new("t9"));
        assert!(err.to_string().contains("t9"));
    }
}
