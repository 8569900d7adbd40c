//! Collaborator traits the host supplies, plus ready-made implementations.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{ChatMessage, EditEvent};

/// A live token stream from the LLM provider.
#[async_trait]
pub trait TokenStream: Send {
    /// The next text chunk, or `None` once the stream is finished.
    async fn next_chunk(&mut self) -> Result<Option<String>, TransportError>;
}

/// Opens a fresh token stream for a conversation. Each retry attempt opens
/// its own stream.
#[async_trait]
pub trait StreamSource: Send {
    async fn open(
        &mut self,
        messages: &[ChatMessage],
    ) -> Result<Box<dyn TokenStream>, TransportError>;
}

/// Exposes the current text of every path the model may reference.
pub trait ContentProvider: Send + Sync {
    /// Current content of `path`, or `None` if the file does not exist yet.
    fn content(&self, path: &str) -> Option<String>;

    /// Optional 1-indexed inclusive line range edits to `path` must stay in.
    fn guard(&self, path: &str) -> Option<(usize, usize)> {
        let _ = path;
        None
    }
}

/// In-memory content provider.
#[derive(Debug, Default)]
pub struct MapContentProvider {
    files: HashMap<String, String>,
    guards: HashMap<String, (usize, usize)>,
}

impl MapContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn set_guard(&mut self, path: impl Into<String>, start_line: usize, end_line: usize) {
        self.guards.insert(path.into(), (start_line, end_line));
    }
}

impl ContentProvider for MapContentProvider {
    fn content(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    fn guard(&self, path: &str) -> Option<(usize, usize)> {
        self.guards.get(path).copied()
    }
}

/// Content provider rooted at a directory on disk. Paths outside the root
/// resolve to `None` rather than escaping it.
#[derive(Debug)]
pub struct DirContentProvider {
    root: PathBuf,
}

impl DirContentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ContentProvider for DirContentProvider {
    fn content(&self, path: &str) -> Option<String> {
        let joined = self.root.join(path);
        let canonical = joined.canonicalize().ok()?;
        let root = self.root.canonicalize().ok()?;
        if !canonical.starts_with(&root) {
            return None;
        }
        std::fs::read_to_string(canonical).ok()
    }
}

/// Receives progress events. All methods are optional.
pub trait ProgressSink: Send {
    fn on_event(&mut self, event: &EditEvent) {
        let _ = event;
    }
}

/// A progress sink that ignores everything.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}
