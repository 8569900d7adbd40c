//! The match engine: the strategy chain plus guard filtering.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MatchError, Result};
use crate::strategy::{self, CHAIN};

/// Precision level a match was found at, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchLevel {
    Exact,
    Stripped,
    NonContiguous,
    Fuzzy,
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchLevel::Exact => "exact",
            MatchLevel::Stripped => "whitespace-insensitive",
            MatchLevel::NonContiguous => "elision-spanning",
            MatchLevel::Fuzzy => "fuzzy",
        };
        f.write_str(name)
    }
}

/// A located span: contiguous byte offsets into the searched content, even
/// when the snippet used elision or fuzzy matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub start: usize,
    pub end: usize,
    pub level: MatchLevel,
    /// Average per-line similarity, present for fuzzy matches only
    pub similarity: Option<f64>,
}

impl MatchResult {
    /// The matched text as it appears in the original content.
    pub fn text<'a>(&self, content: &'a str) -> &'a str {
        &content[self.start..self.end]
    }
}

/// Locate `search` inside `content`, trying each level in order.
pub fn find_match(content: &str, search: &str) -> Result<MatchResult> {
    search_impl(content, search, None)
}

/// Like [`find_match`], but reject any span outside the 1-indexed inclusive
/// line range. Filtering happens after a concrete span is computed, so a
/// level whose only candidates land outside the range falls through to the
/// next level.
pub fn find_match_with_guard(
    content: &str,
    search: &str,
    start_line: usize,
    end_line: usize,
) -> Result<MatchResult> {
    search_impl(content, search, Some((start_line, end_line)))
}

fn search_impl(
    content: &str,
    search: &str,
    guard: Option<(usize, usize)>,
) -> Result<MatchResult> {
    if search.trim().is_empty() {
        return Err(not_found(content, search));
    }

    let mut rejected: Option<(usize, usize)> = None;
    for s in CHAIN {
        for c in s.candidates(content, search) {
            if let Some((gs, ge)) = guard {
                let (ls, le) = span_lines(content, c.start, c.end);
                if ls < gs || le > ge {
                    rejected.get_or_insert((ls, le));
                    continue;
                }
            }
            debug!(level = %s.level(), start = c.start, end = c.end, "search snippet located");
            return Ok(MatchResult {
                start: c.start,
                end: c.end,
                level: s.level(),
                similarity: c.similarity,
            });
        }
    }

    match (guard, rejected) {
        (Some((gs, ge)), Some((fs, fe))) => Err(MatchError::GuardViolation {
            allowed_start: gs,
            allowed_end: ge,
            found_start: fs,
            found_end: fe,
        }),
        _ => Err(not_found(content, search)),
    }
}

fn not_found(content: &str, search: &str) -> MatchError {
    let levels_tried = if strategy::has_elision(search) {
        "exact, whitespace-insensitive, elision-spanning, fuzzy"
    } else {
        "exact, whitespace-insensitive, fuzzy"
    };
    let best = strategy::best_average_similarity(content, search).unwrap_or(0.0);
    MatchError::NotFound {
        levels_tried: levels_tried.to_string(),
        best_percent: (best * 100.0).round() as u32,
    }
}

/// 1-indexed first and last line touched by the byte span.
fn span_lines(content: &str, start: usize, end: usize) -> (usize, usize) {
    let line_of = |byte: usize| content[..byte].bytes().filter(|&b| b == b'\n').count() + 1;
    let last_byte = end.saturating_sub(1).max(start);
    (line_of(start), line_of(last_byte))
}
