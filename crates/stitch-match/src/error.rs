//! Error types for snippet matching.

use thiserror::Error;

/// Errors returned when a search snippet cannot be located.
///
/// Display text is written to be quoted verbatim in retry feedback to the
/// model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    /// Every match level was exhausted without an acceptable span
    #[error("search block not found (tried {levels_tried}; best fuzzy similarity {best_percent}%)")]
    NotFound {
        levels_tried: String,
        best_percent: u32,
    },

    /// A span was found, but only outside the allowed line range
    #[error("search block only matches outside the allowed line range {allowed_start}..={allowed_end} (nearest match at lines {found_start}..={found_end})")]
    GuardViolation {
        allowed_start: usize,
        allowed_end: usize,
        found_start: usize,
        found_end: usize,
    },
}

/// Result type for match operations.
pub type Result<T> = std::result::Result<T, MatchError>;
