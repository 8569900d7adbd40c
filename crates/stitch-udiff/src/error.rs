//! Error types for diff parsing and application.

use thiserror::Error;

/// Errors that can occur while parsing or applying a diff.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    /// The diff body did not contain anything applicable
    #[error("malformed diff: {0}")]
    Grammar(String),

    /// A hunk could not be placed in the content
    #[error("hunk {index} could not be applied: {detail}")]
    HunkFailed { index: usize, detail: String },

    /// A hunk's anchor matched more than one location
    #[error("hunk {index} anchor is ambiguous: {detail}")]
    AmbiguousAnchor { index: usize, detail: String },

    /// An elision scan ran off the end of the file without closing its scope
    #[error("hunk {index} elision scan reached end of file without closing scope")]
    UnclosedScope { index: usize },
}

/// Result type for diff operations.
pub type Result<T> = std::result::Result<T, PatchError>;
