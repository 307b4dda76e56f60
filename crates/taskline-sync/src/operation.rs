//! Client-submitted mutation intents.

use serde::{Deserialize, Serialize};

use taskline_core::{OpId, TaskId};

use crate::payload::Payload;

/// The kind of mutation an operation requests.
///
/// Carried as a plain string on the wire so that operations with kinds this
/// server version does not know are dropped silently instead of failing the
/// whole batch decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Insert a new task under a client-chosen ID.
    Create,
    /// Merge payload fields into an existing task.
    Update,
    /// Soft-delete an existing task.
    Delete,
}

impl OpKind {
    /// Parses a wire kind; `None` for anything unrecognized.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns the wire representation of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A single client-submitted mutation in a push batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Client-generated idempotency token, stable across retries.
    pub op_id: OpId,
    /// The task the operation targets.
    pub entity_id: TaskId,
    /// Requested mutation kind (`create`, `update`, `delete`).
    #[serde(rename = "operation")]
    pub kind: String,
    /// The version the client last observed; zero opts out of the check.
    #[serde(default)]
    pub base_version: i64,
    /// Optional field map (`title`, `status`, `due_at`, `attachment_ids`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Operation {
    /// Creates an operation with no version check and no payload.
    #[must_use]
    pub fn new(op_id: impl Into<OpId>, entity_id: impl Into<TaskId>, kind: OpKind) -> Self {
        Self {
            op_id: op_id.into(),
            entity_id: entity_id.into(),
            kind: kind.as_str().to_string(),
            base_version: 0,
            payload: None,
        }
    }

    /// Sets the base version for the optimistic-concurrency check.
    #[must_use]
    pub const fn with_base_version(mut self, base_version: i64) -> Self {
        self.base_version = base_version;
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_the_wire_form() {
        for kind in [OpKind::Create, OpKind::Update, OpKind::Delete] {
            assert_eq!(OpKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_kinds_do_not_parse() {
        assert_eq!(OpKind::parse("upsert"), None);
        assert_eq!(OpKind::parse(""), None);
        assert_eq!(OpKind::parse("CREATE"), None);
    }

    #[test]
    fn operation_deserializes_wire_shape() {
        let op: Operation = serde_json::from_str(
            r#"{"op_id":"o1","entity_id":"t1","operation":"create","base_version":0}"#,
        )
        .unwrap();
        assert_eq!(op.kind, "create");
        assert!(op.payload.is_none());
    }
}
