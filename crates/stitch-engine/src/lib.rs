//! Retry orchestration: drive the stream parser over a live token stream,
//! verify and apply each proposed edit, and feed failures back to the model.
//!
//! # Architecture
//!
//! This is the composition crate of the workspace:
//! - Depends on: stitch-stream (parsing), stitch-match (search location),
//!   stitch-udiff (hunk application)
//! - Used by: the host application (chat session, CLI, ...)
//!
//! The host supplies three collaborators: a [`StreamSource`] that opens a
//! token stream for a conversation, a [`ContentProvider`] exposing current
//! file text (plus optional per-path line guards), and a [`ProgressSink`]
//! for observational events. One [`RetryOrchestrator::execute`] call runs up
//! to [`MAX_ATTEMPTS`] attempts and returns the final [`EditOutcome`].

mod error;
mod orchestrator;
mod provider;
mod retry;
mod types;

pub use error::{EngineError, Result, TransportError};
pub use orchestrator::{EditOutcome, RetryOrchestrator, MAX_ATTEMPTS};
pub use provider::{
    ContentProvider, DirContentProvider, MapContentProvider, NoProgress, ProgressSink,
    StreamSource, TokenStream,
};
pub use types::{ChatMessage, EditEvent, EditFormat, EditResult, MessageRole, RetryContext};
