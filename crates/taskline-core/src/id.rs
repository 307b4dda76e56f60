//! Strongly-typed identifiers for Taskline entities.
//!
//! All identifiers in Taskline are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Client-chosen**: Sync clients mint task and operation IDs offline, so
//!   the server treats them as opaque strings rather than generated values
//! - **Cheap to share**: Thin wrappers around `String` with transparent serde
//!
//! # Example
//!
//! ```rust
//! use taskline_core::id::{OpId, TaskId};
//!
//! let task = TaskId::new("t-7f3a");
//! let op = OpId::new("device1-00042");
//!
//! // IDs are different types - this won't compile:
//! // let wrong: TaskId = op;
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a user.
///
/// Supplied by the authentication layer on every request; every store access
/// is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID from an opaque string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A unique identifier for a task entity.
///
/// Chosen by the client at create time so that offline devices can mint IDs
/// without coordination. Globally unique across users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task ID from an opaque string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A client-generated token uniquely identifying a sync operation.
///
/// Stable across retries; the idempotency index is keyed by
/// `(UserId, OpId)`. An empty op ID marks an operation the engine drops
/// silently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

impl OpId {
    /// Creates an op ID from an opaque string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the token is empty (never applied, never recorded).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OpId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A unique identifier for a stored attachment file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Creates a file ID from an opaque string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = TaskId::new("t1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t1\"");
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn op_id_emptiness() {
        assert!(OpId::new("").is_empty());
        assert!(!OpId::new("o1").is_empty());
    }

    #[test]
    fn distinct_values_compare_unequal() {
        assert_ne!(UserId::new("u1"), UserId::new("u2"));
    }
}
