//! The retry loop that drives one token stream per attempt through the
//! stream parser, applying edits against a working copy of each file.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stitch_match::{find_match, find_match_with_guard, MatchLevel};
use stitch_stream::{EditSink, StreamParser};
use stitch_udiff::{DiffApplier, FileDiff, WarningKind};

use crate::error::{EngineError, Result};
use crate::provider::{ContentProvider, ProgressSink, StreamSource};
use crate::retry::render_retry_prompt;
use crate::types::{ChatMessage, EditEvent, EditFormat, EditResult, RetryContext};

/// Maximum number of whole-stream attempts, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Final product of a successful run: one result per file block, plus the
/// model's trailing summary if it sent one.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub edits: Vec<EditResult>,
    pub about: Option<String>,
}

/// Drives the parser over a live token stream and retries failed attempts
/// with structured feedback, up to [`MAX_ATTEMPTS`].
///
/// Each attempt gets a fresh parser and a fresh working-content map, so a
/// failed attempt never leaks partial edits into the next one.
pub struct RetryOrchestrator<S, C, P> {
    source: S,
    provider: C,
    progress: P,
    cancel: CancellationToken,
}

impl<S: StreamSource, C: ContentProvider, P: ProgressSink> RetryOrchestrator<S, C, P> {
    pub fn new(source: S, provider: C, progress: P) -> Self {
        Self {
            source,
            provider,
            progress,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token for the in-flight stream.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the full edit conversation to completion.
    ///
    /// Transport failures abort immediately without consuming an attempt.
    /// Cancellation is surfaced as [`EngineError::Cancelled`] unless the
    /// parser had already halted on a validation failure, in which case the
    /// halt drives a normal retry.
    pub async fn execute(&mut self, initial_messages: Vec<ChatMessage>) -> Result<EditOutcome> {
        let Self {
            source,
            provider,
            progress,
            cancel,
        } = self;
        let mut messages = initial_messages;
        let mut last_failure = String::from("no attempt was made");

        for attempt in 1..=MAX_ATTEMPTS {
            progress.on_event(&EditEvent::AttemptStarted { attempt });
            debug!(attempt, "starting edit attempt");

            let mut stream = source.open(&messages).await?;
            let mut parser = StreamParser::new(AttemptState::new(&*provider, &mut *progress));
            let mut partial = String::new();
            let mut cancelled = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    chunk = stream.next_chunk() => match chunk? {
                        Some(text) => {
                            partial.push_str(&text);
                            if parser.feed(&text).is_err() {
                                // Halted; stop reading, the halt error and
                                // the sink's failure record say why
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            drop(stream);

            if cancelled && !parser.is_halted() {
                return Err(EngineError::Cancelled);
            }

            if !parser.is_halted() {
                // End-of-stream grammar problems land in the halt state too
                let _ = parser.finish();
            }

            let halt = parser.halt_error().cloned();
            let state = parser.into_sink();
            let current_path = state.current_path();

            let failure = match (halt, state.failure) {
                (_, Some(f)) => Some(f),
                (Some(err), None) => Some(Failure {
                    path: current_path.unwrap_or_default(),
                    failed_lines: String::new(),
                    file_content: String::new(),
                    reason: err.to_string(),
                }),
                (None, None) => None,
            };

            match failure {
                None => {
                    return Ok(EditOutcome {
                        edits: state.results,
                        about: state.about,
                    });
                }
                Some(f) => {
                    last_failure = if f.path.is_empty() {
                        f.reason.clone()
                    } else {
                        format!("{}: {}", f.path, f.reason)
                    };
                    warn!(attempt, failure = %last_failure, "edit attempt failed");

                    let ctx = RetryContext {
                        path: f.path,
                        failed_lines: f.failed_lines,
                        file_content: f.file_content,
                        reason: f.reason,
                        partial_output: partial.clone(),
                    };
                    if !partial.is_empty() {
                        messages.push(ChatMessage::assistant(partial));
                    }
                    messages.push(ChatMessage::user(render_retry_prompt(ctx)));
                }
            }
        }

        Err(EngineError::AttemptsExhausted {
            attempts: MAX_ATTEMPTS,
            last_failure,
        })
    }
}

/// First failure recorded during one attempt.
struct Failure {
    path: String,
    failed_lines: String,
    file_content: String,
    reason: String,
}

/// A file block being accumulated.
struct PendingFile {
    path: String,
    old_content: String,
    format: EditFormat,
    match_level: Option<MatchLevel>,
    warnings: Vec<String>,
    error: Option<String>,
}

/// Sink wired into the parser for the duration of one attempt. Owns the
/// attempt's working-content map; the provider is only read.
struct AttemptState<'a, C, P> {
    provider: &'a C,
    progress: &'a mut P,
    working: HashMap<String, String>,
    results: Vec<EditResult>,
    current: Option<PendingFile>,
    pending_match: Option<(usize, usize)>,
    about: Option<String>,
    failure: Option<Failure>,
}

impl<'a, C: ContentProvider, P: ProgressSink> AttemptState<'a, C, P> {
    fn new(provider: &'a C, progress: &'a mut P) -> Self {
        Self {
            provider,
            progress,
            working: HashMap::new(),
            results: Vec::new(),
            current: None,
            pending_match: None,
            about: None,
            failure: None,
        }
    }

    fn current_path(&self) -> Option<String> {
        self.current.as_ref().map(|c| c.path.clone())
    }

    /// Working copy of a file: this attempt's edits first, then the
    /// provider's authoritative content, then empty for brand-new files.
    fn working_content(&self, path: &str) -> String {
        self.working
            .get(path)
            .cloned()
            .or_else(|| self.provider.content(path))
            .unwrap_or_default()
    }

    fn record_weakest_level(&mut self, level: MatchLevel) {
        if let Some(cur) = &mut self.current {
            cur.match_level = Some(match cur.match_level {
                Some(existing) if level_rank(existing) >= level_rank(level) => existing,
                _ => level,
            });
        }
    }
}

fn level_rank(level: MatchLevel) -> u8 {
    match level {
        MatchLevel::Exact => 0,
        MatchLevel::Stripped => 1,
        MatchLevel::NonContiguous => 2,
        MatchLevel::Fuzzy => 3,
    }
}

impl<C: ContentProvider, P: ProgressSink> EditSink for AttemptState<'_, C, P> {
    fn on_file_start(&mut self, path: &str) {
        let old_content = self.working_content(path);
        self.current = Some(PendingFile {
            path: path.to_string(),
            old_content,
            format: EditFormat::SearchReplace,
            match_level: None,
            warnings: Vec::new(),
            error: None,
        });
        self.progress.on_event(&EditEvent::FileStarted {
            path: path.to_string(),
        });
    }

    fn on_search_block(&mut self, path: &str, search: &str) -> std::result::Result<(), String> {
        let content = self.working_content(path);

        if search.trim().is_empty() {
            if content.is_empty() {
                // New-file block: the replace text becomes the whole file
                self.pending_match = Some((0, 0));
                return Ok(());
            }
            let reason = "empty SEARCH block on an existing file".to_string();
            self.progress.on_event(&EditEvent::SearchFailed {
                path: path.to_string(),
                reason: reason.clone(),
            });
            self.failure.get_or_insert(Failure {
                path: path.to_string(),
                failed_lines: String::new(),
                file_content: content,
                reason: reason.clone(),
            });
            return Err(reason);
        }

        let located = match self.provider.guard(path) {
            Some((start, end)) => find_match_with_guard(&content, search, start, end),
            None => find_match(&content, search),
        };

        match located {
            Ok(m) => {
                self.pending_match = Some((m.start, m.end));
                self.record_weakest_level(m.level);
                self.progress.on_event(&EditEvent::SearchMatched {
                    path: path.to_string(),
                    level: m.level,
                });
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                self.progress.on_event(&EditEvent::SearchFailed {
                    path: path.to_string(),
                    reason: reason.clone(),
                });
                self.failure.get_or_insert(Failure {
                    path: path.to_string(),
                    failed_lines: search.to_string(),
                    file_content: content,
                    reason: reason.clone(),
                });
                Err(reason)
            }
        }
    }

    fn on_replace_block(&mut self, path: &str, _search: &str, replace: &str) {
        let Some((start, end)) = self.pending_match.take() else {
            return;
        };
        let content = self.working_content(path);
        let mut new_content = String::with_capacity(content.len() + replace.len());
        new_content.push_str(&content[..start]);
        new_content.push_str(replace);
        new_content.push_str(&content[end..]);
        self.working.insert(path.to_string(), new_content);

        if let Some(cur) = &mut self.current {
            cur.format = EditFormat::SearchReplace;
        }
        self.progress.on_event(&EditEvent::EditApplied {
            path: path.to_string(),
            format: EditFormat::SearchReplace,
        });
    }

    fn on_file_diff(&mut self, diff: &FileDiff) {
        let content = self.working_content(&diff.path);
        let (new_content, warnings) = DiffApplier::apply_with_warnings(&content, &diff.hunks);

        let mut skipped: Vec<String> = Vec::new();
        for w in warnings {
            match w.kind {
                WarningKind::HunkSkipped => skipped.push(w.message),
                _ => {
                    if let Some(cur) = &mut self.current {
                        cur.warnings.push(w.message);
                    }
                }
            }
        }

        self.working.insert(diff.path.clone(), new_content);
        if let Some(cur) = &mut self.current {
            cur.format = EditFormat::UnifiedDiff;
        }

        if skipped.is_empty() {
            self.progress.on_event(&EditEvent::EditApplied {
                path: diff.path.clone(),
                format: EditFormat::UnifiedDiff,
            });
        } else {
            let reason = format!(
                "{} of {} hunks could not be applied",
                skipped.len(),
                diff.hunks.len()
            );
            if let Some(cur) = &mut self.current {
                cur.error = Some(reason.clone());
            }
            self.progress.on_event(&EditEvent::SearchFailed {
                path: diff.path.clone(),
                reason: reason.clone(),
            });
            self.failure.get_or_insert(Failure {
                path: diff.path.clone(),
                failed_lines: skipped.join("\n"),
                file_content: content,
                reason,
            });
        }
    }

    fn on_about_text(&mut self, text: &str) {
        self.about = Some(text.to_string());
        self.progress.on_event(&EditEvent::AboutText {
            text: text.to_string(),
        });
    }

    fn on_file_complete(&mut self, _path: &str) {
        if let Some(cur) = self.current.take() {
            let new_content = self
                .working
                .get(&cur.path)
                .cloned()
                .unwrap_or_else(|| cur.old_content.clone());
            let warning = if cur.warnings.is_empty() {
                None
            } else {
                Some(cur.warnings.join("; "))
            };
            self.results.push(EditResult {
                path: cur.path,
                old_content: cur.old_content,
                new_content,
                format: cur.format,
                match_level: cur.match_level,
                warning,
                error: cur.error,
            });
        }
        self.pending_match = None;
    }
}
