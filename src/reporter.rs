//! Error reporter collaborator.
//!
//! Decode failures never tear down the pipeline. They are handed to an
//! [`ErrorReporter`] together with the identity of the image source.

use tracing::warn;

use crate::error::TileError;

/// Receives failures the engine recovered from.
///
/// Implementations must not panic; the engine continues regardless of what the
/// reporter does.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &TileError, source_id: &str);
}

/// Reports failures as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &TileError, source_id: &str) {
        warn!(source_id, error = %error, "Sub-sampled image error");
    }
}
