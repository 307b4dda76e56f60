//! # taskline-sync
//!
//! The multi-device synchronization engine at the heart of the Taskline
//! backend. Clients keep a local replica of their own task collection and
//! reconcile with the server through two symmetric operations:
//!
//! - **push** — submit a batch of locally-generated mutations;
//! - **pull** — stream remote mutations newer than a client-held cursor.
//!
//! ## Guarantees
//!
//! - **Idempotence**: every operation carries a client-minted `op_id`;
//!   replaying a push any number of times yields the same task state and a
//!   single applied-op record.
//! - **Optimistic concurrency**: updates carry the version the client last
//!   observed; a mismatch is reported as a conflict together with the
//!   current authoritative snapshot.
//! - **Ordered change stream**: every accepted mutation appends one entry to
//!   a per-user, cursor-ordered change log that pull pages through.
//! - **Dead-letter observation**: operations that keep failing past the
//!   retry budget are flagged once for external quarantine policy.
//!
//! ## Design Principles
//!
//! Storage is pluggable behind traits ([`TaskStore`], [`CursorStore`],
//! [`ChangeLog`], [`FailureTracker`], [`AttachmentLinker`]); in-memory
//! implementations ship here for tests and single-node deployments, and a
//! relational backend can be slotted in behind the identical contracts.
//! The engine holds collaborators by `Arc` and never owns their state.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod attachments;
pub mod changelog;
pub mod cursor_store;
pub mod error;
pub mod failure;
pub mod metrics;
pub mod operation;
pub mod payload;
pub mod service;
pub mod task;

pub use attachments::{AttachmentLinker, InMemoryAttachmentLinker};
pub use changelog::{ChangeEntry, ChangeLog, InMemoryChangeLog};
pub use cursor_store::{CursorStore, InMemoryCursorStore};
pub use error::{Error, Result};
pub use failure::{FailureTracker, InMemoryFailureTracker};
pub use operation::{OpKind, Operation};
pub use payload::Payload;
pub use service::{Conflict, PullOutcome, PushOutcome, SyncService};
pub use task::{InMemoryTaskStore, TaskSnapshot, TaskStore};
