//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
///
/// Per the failure policy, plugin and handler failures never surface here;
/// they are logged and contained. The variants below are the startup-fatal
/// conditions: a broken configuration or a dispatch infrastructure that
/// cannot be brought up.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The worker pool backing dispatch could not be built.
    #[error("Failed to build the dispatch worker pool: {0}")]
    WorkerPool(#[from] std::io::Error),

    /// A lifecycle operation was called before `init`.
    #[error("Runtime is not initialized")]
    NotInitialized,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
