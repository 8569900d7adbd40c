//! The ordered chain of matching strategies.

use crate::engine::MatchLevel;
use crate::levenshtein::normalized_similarity;

/// Per-line similarity a fuzzy window must clear on every line.
pub(crate) const FUZZY_LINE_THRESHOLD: f64 = 0.75;

/// A span a strategy is willing to return, byte offsets into the content.
pub(crate) struct Candidate {
    pub start: usize,
    pub end: usize,
    pub similarity: Option<f64>,
}

/// One precision level of the match chain.
///
/// Strategies yield candidates in preference order; the engine applies guard
/// filtering and takes the first survivor, so a new level slots into [`CHAIN`]
/// without touching call sites.
pub(crate) trait Strategy: Sync {
    fn level(&self) -> MatchLevel;
    fn candidates(&self, content: &str, search: &str) -> Vec<Candidate>;
}

pub(crate) static CHAIN: &[&dyn Strategy] = &[&Exact, &Stripped, &NonContiguous, &Fuzzy];

/// Byte range (start, end-exclusive, newline not included) of every line.
fn line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            spans.push((start, i));
            start = i + 1;
        }
    }
    if start < content.len() {
        spans.push((start, content.len()));
    }
    spans
}

fn content_lines<'a>(content: &'a str, spans: &[(usize, usize)]) -> Vec<&'a str> {
    spans.iter().map(|&(s, e)| &content[s..e]).collect()
}

/// Window positions where `part` matches `lines`, exact first, then
/// per-line stripped.
fn locate_part(lines: &[&str], part: &[&str]) -> Vec<usize> {
    if part.is_empty() || lines.len() < part.len() {
        return Vec::new();
    }
    let last = lines.len() - part.len();
    let exact: Vec<usize> = (0..=last)
        .filter(|&i| part.iter().enumerate().all(|(k, p)| lines[i + k] == *p))
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    (0..=last)
        .filter(|&i| {
            part.iter()
                .enumerate()
                .all(|(k, p)| lines[i + k].trim() == p.trim())
        })
        .collect()
}

struct Exact;

impl Strategy for Exact {
    fn level(&self) -> MatchLevel {
        MatchLevel::Exact
    }

    fn candidates(&self, content: &str, search: &str) -> Vec<Candidate> {
        if search.is_empty() {
            return Vec::new();
        }
        content
            .match_indices(search)
            .map(|(i, _)| Candidate {
                start: i,
                end: i + search.len(),
                similarity: None,
            })
            .collect()
    }
}

struct Stripped;

impl Strategy for Stripped {
    fn level(&self) -> MatchLevel {
        MatchLevel::Stripped
    }

    fn candidates(&self, content: &str, search: &str) -> Vec<Candidate> {
        let spans = line_spans(content);
        let lines = content_lines(content, &spans);
        let needle: Vec<&str> = search.lines().collect();
        if needle.is_empty() || lines.len() < needle.len() {
            return Vec::new();
        }
        let n = needle.len();
        (0..=lines.len() - n)
            .filter(|&i| {
                needle
                    .iter()
                    .enumerate()
                    .all(|(k, p)| lines[i + k].trim() == p.trim())
            })
            .map(|i| Candidate {
                start: spans[i].0,
                end: spans[i + n - 1].1,
                similarity: None,
            })
            .collect()
    }
}

struct NonContiguous;

impl Strategy for NonContiguous {
    fn level(&self) -> MatchLevel {
        MatchLevel::NonContiguous
    }

    fn candidates(&self, content: &str, search: &str) -> Vec<Candidate> {
        let needle: Vec<&str> = search.lines().collect();
        let Some(e) = needle.iter().position(|l| is_elision(l)) else {
            return Vec::new();
        };
        let prefix = &needle[..e];
        let suffix = &needle[e + 1..];
        if prefix.is_empty() || suffix.is_empty() {
            return Vec::new();
        }

        let spans = line_spans(content);
        let lines = content_lines(content, &spans);
        let prefix_hits = locate_part(&lines, prefix);
        let suffix_hits = locate_part(&lines, suffix);

        let mut out = Vec::new();
        for &p in &prefix_hits {
            let prefix_end = p + prefix.len() - 1;
            for &s in &suffix_hits {
                // The elision absorbs everything between prefix and suffix,
                // so the suffix must start strictly after the prefix ends
                if s > prefix_end {
                    out.push(Candidate {
                        start: spans[p].0,
                        end: spans[s + suffix.len() - 1].1,
                        similarity: None,
                    });
                }
            }
        }
        out
    }
}

/// Elision marker inside a search snippet.
pub(crate) fn is_elision(line: &str) -> bool {
    line.trim() == "..."
}

/// Whether a snippet would engage the elision-spanning level at all.
pub(crate) fn has_elision(search: &str) -> bool {
    search.lines().any(is_elision)
}

struct Fuzzy;

impl Strategy for Fuzzy {
    fn level(&self) -> MatchLevel {
        MatchLevel::Fuzzy
    }

    fn candidates(&self, content: &str, search: &str) -> Vec<Candidate> {
        let spans = line_spans(content);
        let lines = content_lines(content, &spans);
        let needle: Vec<&str> = search.lines().collect();
        if needle.is_empty() || lines.len() < needle.len() {
            return Vec::new();
        }
        let n = needle.len();

        let mut out: Vec<(usize, f64)> = Vec::new();
        'window: for i in 0..=lines.len() - n {
            let mut total = 0.0;
            for (k, p) in needle.iter().enumerate() {
                let sim = normalized_similarity(lines[i + k], p);
                if sim <= FUZZY_LINE_THRESHOLD {
                    continue 'window;
                }
                total += sim;
            }
            out.push((i, total / n as f64));
        }

        // Best average first; ties resolved by lowest start offset
        out.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        out.into_iter()
            .map(|(i, avg)| Candidate {
                start: spans[i].0,
                end: spans[i + n - 1].1,
                similarity: Some(avg),
            })
            .collect()
    }
}

/// Best average per-line similarity over all windows, ignoring the
/// acceptance threshold. Diagnostics only.
pub(crate) fn best_average_similarity(content: &str, search: &str) -> Option<f64> {
    let spans = line_spans(content);
    let lines = content_lines(content, &spans);
    let needle: Vec<&str> = search.lines().collect();
    if needle.is_empty() || lines.len() < needle.len() {
        return None;
    }
    let n = needle.len();
    (0..=lines.len() - n)
        .map(|i| {
            needle
                .iter()
                .enumerate()
                .map(|(k, p)| normalized_similarity(lines[i + k], p))
                .sum::<f64>()
                / n as f64
        })
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}
