//! Public data types: conversation messages, edit results, progress events.

use serde::{Deserialize, Serialize};

use stitch_match::MatchLevel;

/// Role of one conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in the conversation driving the token stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Which wire format produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditFormat {
    SearchReplace,
    UnifiedDiff,
}

/// The finalized outcome for one `[FILE: ...]` block.
///
/// Created when the block is recognized, finalized when it closes (or the
/// stream ends), immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditResult {
    pub path: String,
    /// Snapshot of the file before this block's edits
    pub old_content: String,
    pub new_content: String,
    pub format: EditFormat,
    /// Weakest match level any pair in the block needed (search/replace only)
    pub match_level: Option<MatchLevel>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

/// Structured failure information fed back into the conversation to prompt
/// a corrected attempt. Created only on failure, consumed exactly once.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub path: String,
    /// The search or diff lines that failed to locate/apply
    pub failed_lines: String,
    /// Current content of the file the edit targeted
    pub file_content: String,
    pub reason: String,
    /// Everything the model streamed before the failure
    pub partial_output: String,
}

/// Observational progress events. Purely informational; nothing here feeds
/// back into control flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditEvent {
    AttemptStarted { attempt: u32 },
    FileStarted { path: String },
    SearchMatched { path: String, level: MatchLevel },
    SearchFailed { path: String, reason: String },
    EditApplied { path: String, format: EditFormat },
    AboutText { text: String },
}
