//! # taskline-core
//!
//! Core abstractions for the Taskline task-sync backend.
//!
//! This crate provides the foundational types used across all Taskline
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for users, tasks, operations, and files
//! - **Cursors**: The per-user change-stream position type
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span constructors
//!
//! ## Crate Boundary
//!
//! `taskline-core` is the **only** crate allowed to define shared primitives.
//! The sync engine and the API surface both build on the contracts defined
//! here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cursor;
pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use taskline_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cursor::Cursor;
    pub use crate::error::{Error, Result};
    pub use crate::id::{FileId, OpId, TaskId, UserId};
}

pub use cursor::Cursor;
pub use error::{Error, Result};
pub use id::{FileId, OpId, TaskId, UserId};
pub use observability::{LogFormat, init_logging};
