//! Failure taxonomy shared by both membranes and the runtime above them.
//!
//! Every variant is a hard failure. Nothing is retried: once a membrane or
//! replay invariant breaks, the caller gets the error and the operation is
//! abandoned.

use thiserror::Error;

/// Errors raised while translating values or dispatching actions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MembraneError {
    /// A malformed or unexpected action or wire value.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A recorded journal entry disagrees with the one re-derived on replay.
    #[error("replay mismatch at journal index {index}: expected {expected}, recorded {recorded}")]
    ReplayMismatch {
        index: u64,
        expected: String,
        recorded: String,
    },

    /// A value with no wire encoding was offered for transmission.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// The target object rejected a meta-operation (e.g. invoking a
    /// non-callable object).
    #[error("operation rejected: {0}")]
    Fault(String),

    /// The durable journal mirror could not be written.
    #[error("journal persistence failed: {0}")]
    Persistence(String),
}
