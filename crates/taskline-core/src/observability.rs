//! Observability infrastructure for Taskline.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors for consistent observability
//! across all Taskline components.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt,
};

static INIT: Once = Once::new();

/// Filter applied when `RUST_LOG` is unset: quiet dependencies at `info`,
/// keep the sync engine's per-operation events.
const DEFAULT_LOG_FILTER: &str = "info,taskline_sync=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

type FilteredRegistry = tracing_subscriber::layer::Layered<EnvFilter, Registry>;

impl LogFormat {
    fn layer(self) -> Box<dyn Layer<FilteredRegistry> + Send + Sync> {
        match self {
            // Flattened events keep one JSON object per line for log
            // pipelines that index on field names.
            Self::Json => fmt::layer().json().flatten_event(true).boxed(),
            Self::Pretty => fmt::layer().pretty().boxed(),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Overrides the default filter
///   (`info,taskline_sync=debug`), e.g. `warn` or `taskline_api=trace`
///
/// # Example
///
/// ```rust
/// use taskline_core::observability::{LogFormat, init_logging};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        tracing_subscriber::registry()
            .with(filter)
            .with(format.layer())
            .init();
    });
}

/// Creates a span for sync engine operations with standard fields.
///
/// # Example
///
/// ```rust
/// use taskline_core::observability::sync_span;
///
/// let span = sync_span("push", "user-123");
/// let _guard = span.enter();
/// // ... apply the batch
/// ```
#[must_use]
pub fn sync_span(operation: &str, user: &str) -> Span {
    tracing::info_span!("sync", op = operation, user = user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn default_filter_is_a_valid_directive() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn sync_span_carries_fields() {
        let span = sync_span("push", "u1");
        let _guard = span.enter();
        tracing::info!("inside sync span");
    }
}
