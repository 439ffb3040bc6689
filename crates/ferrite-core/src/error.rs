//! Error types for the Ferrite core.

use thiserror::Error;

/// Boxed error type carried by handler invocations and plugin factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a manifest entry was rejected during handler extraction.
///
/// Rejections are per-function: one bad entry never fails the plugin load as
/// a whole. The runtime logs each rejection and continues with the remaining
/// entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The function does not take exactly one parameter.
    #[error("parameter count is {0}, expected 1")]
    WrongArity(usize),

    /// The single parameter is not a recognized event type.
    #[error("parameter is not an event type")]
    NotAnEvent,

    /// The function body is a default implementation that was never
    /// overridden.
    #[error("default implementation, never overridden")]
    DefaultBody,

    /// The function is not publicly invokable.
    #[error("not publicly invokable")]
    NotPublic,
}
