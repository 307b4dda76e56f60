//! The per-user change-stream cursor.
//!
//! A cursor is a monotonic per-user sequence label identifying a point in
//! that user's change stream. The numeric value is canonical; the decimal
//! string form is only a wire serialization, so `Cursor` compares
//! numerically while serializing as a JSON string.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A monotonic per-user position in the change stream.
///
/// Starts at zero for unknown users, advances by exactly one per accepted
/// change, and never resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor(u64);

impl Cursor {
    /// The cursor before any change has been accepted.
    pub const ZERO: Self = Self(0);

    /// Creates a cursor from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the canonical numeric value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the cursor one position later in the stream.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Parses a client-supplied cursor string, treating anything that is not
    /// a decimal integer (including the empty string) as the beginning of
    /// the stream.
    ///
    /// Pull requests arrive with cursors echoed back from earlier responses;
    /// a missing or mangled value restarts the window rather than erroring.
    #[must_use]
    pub fn parse_or_zero(s: &str) -> Self {
        s.trim().parse::<u64>().map_or(Self::ZERO, Self)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid cursor '{s}': {e}")))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CursorVisitor;

        impl Visitor<'_> for CursorVisitor {
            type Value = Cursor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal cursor string or non-negative integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cursor, E> {
                Ok(Cursor::parse_or_zero(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cursor, E> {
                Ok(Cursor::new(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cursor, E> {
                Ok(Cursor::new(u64::try_from(v).unwrap_or(0)))
            }
        }

        deserializer.deserialize_any(CursorVisitor)
    }
}
