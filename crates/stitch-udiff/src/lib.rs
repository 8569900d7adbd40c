//! Unified diff parsing and application with elision support.
//!
//! This crate turns the diff bodies an LLM emits into structured hunks and
//! applies them to file content. Hunks may contain an elision marker (`-...`)
//! standing in for an unspecified run of lines; the applier resolves the
//! elided region at apply time by scanning brace depth, so "replace a whole
//! function body" edits work without the model enumerating every line.
//!
//! # Architecture
//!
//! This is an infrastructure crate:
//! - Depends on: nothing internal (pure text manipulation)
//! - Used by: stitch-stream (diff-body parsing), stitch-engine (application)
//!
//! # Usage
//!
//! ```rust,ignore
//! use stitch_udiff::{DiffParser, DiffApplier};
//!
//! let diff = DiffParser::parse("src/main.rs", diff_body)?;
//! let (new_content, warnings) = DiffApplier::apply_with_warnings(&content, &diff.hunks);
//! ```

mod applier;
mod error;
mod parser;
mod scan;

pub use applier::{ApplyWarning, DiffApplier, WarningKind};
pub use error::{PatchError, Result};
pub use parser::{DiffLine, DiffParser, FileDiff, Hunk, LineKind};
pub use scan::scan_line;
