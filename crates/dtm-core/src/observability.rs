//! Observability infrastructure for DTM components.
//!
//! Structured logging with consistent spans. This module provides the
//! subscriber initialization helper and the span constructor used for every
//! delta coordination request.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `dtm_delta=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };
        if result.is_err() {
            tracing::debug!("global subscriber already installed; keeping it");
        }
    });
}

/// Creates a span for delta coordination operations with standard fields.
///
/// # Example
///
/// ```rust
/// use dtm_core::observability::delta_span;
///
/// let span = delta_span("writeNewDeltaHot", "prod", "sales");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn delta_span(operation: &str, env: &str, datamart: &str) -> Span {
    tracing::info_span!("delta", op = operation, env = env, datamart = datamart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        // Should not panic (uses Once internally)
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn test_delta_span_creates_span() {
        let span = delta_span("getDeltaOk", "test", "dtm");
        let _guard = span.enter();
        tracing::info!("message in delta span");
    }
}
