//! Error types for stream parsing.

use thiserror::Error;

/// Errors that halt the stream parser.
///
/// Clone matters here: a halted parser keeps returning the same stored error
/// from every subsequent `feed` call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// Malformed or unexpected token in the incoming stream
    #[error("grammar error at line {line}: {message}")]
    Grammar { line: usize, message: String },

    /// The search-validation callback rejected a block
    #[error("edit validation failed: {0}")]
    Validation(String),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, StreamError>;
