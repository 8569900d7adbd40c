//! Incremental parsing of streamed LLM edit proposals.
//!
//! The model's output arrives as arbitrarily sized text chunks. This crate
//! buffers them into lines and recognizes two wire formats — search/replace
//! blocks and unified-diff bodies, both wrapped in `[FILE: ...]` markers —
//! plus a trailing `[ABOUT]` free-text block. Structured callbacks fire as
//! soon as each piece of the grammar is complete, so a caller can validate a
//! search block (and abort the stream) before the model finishes talking.
//!
//! # Architecture
//!
//! This is an infrastructure crate:
//! - Depends on: stitch-udiff (diff-body parsing)
//! - Used by: stitch-engine (drives the parser over a live token stream)

mod error;
mod parser;

pub use error::{StreamError, Result};
pub use parser::{EditSink, ParserState, StreamParser};
