//! Error types for the retry orchestrator.

use thiserror::Error;

/// Failure of the token stream itself, independent of its content.
/// Non-retriable: the orchestrator aborts without consuming an attempt.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Terminal errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The token stream failed independent of content
    #[error("token stream transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The caller cancelled the in-flight stream
    #[error("edit stream cancelled")]
    Cancelled,

    /// The attempt ceiling was hit without a clean application
    #[error("edit attempts exhausted after {attempts} attempts; last failure: {last_failure}")]
    AttemptsExhausted { attempts: u32, last_failure: String },
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, EngineError>;
