//! Parse a delimited unified-diff body into structured hunks.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{PatchError, Result};

/// Role of one line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    /// Unchanged line, present in old and new content
    Context,
    /// Line removed from the old content
    Remove,
    /// Line added to the new content
    Add,
    /// Stands in for zero or more unlisted lines, resolved at apply time
    Elision,
}

/// One line of a hunk, content stored without its diff prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    pub content: String,
}

impl DiffLine {
    pub fn context(content: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Context,
            content: content.into(),
        }
    }

    pub fn remove(content: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Remove,
            content: content.into(),
        }
    }

    pub fn add(content: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Add,
            content: content.into(),
        }
    }

    pub fn elision() -> Self {
        Self {
            kind: LineKind::Elision,
            content: String::new(),
        }
    }
}

/// One contiguous block of changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hunk {
    /// Free text from the `@@ ... @@` header, used only as a human-readable
    /// label, never for matching
    pub anchor: Option<String>,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    pub fn new(lines: Vec<DiffLine>) -> Self {
        Self {
            anchor: None,
            lines,
        }
    }

    /// Whether any line of this hunk is an elision marker.
    pub fn has_elision(&self) -> bool {
        self.lines.iter().any(|l| l.kind == LineKind::Elision)
    }
}

/// A parsed diff for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub hunks: Vec<Hunk>,
}

/// Parser for unified-diff bodies.
pub struct DiffParser;

impl DiffParser {
    /// Parse an already-delimited diff body.
    ///
    /// `default_path` is used when the body carries no usable `---`/`+++`
    /// header (header paths win, with `a/`/`b/` prefixes stripped).
    /// Unknown line types inside the body are ignored; a body that yields no
    /// hunks at all is a grammar error.
    pub fn parse(default_path: &str, body: &str) -> Result<FileDiff> {
        let mut path: Option<String> = None;
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut current: Vec<DiffLine> = Vec::new();
        let mut anchor: Option<String> = None;
        let mut in_hunk = false;

        for raw_line in body.lines() {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

            // Git-style noise headers
            if line.starts_with("diff ")
                || line.starts_with("index ")
                || line.starts_with("new file mode")
                || line.starts_with("deleted file mode")
            {
                continue;
            }

            if let Some(rest) = line.strip_prefix("--- ") {
                if path.is_none() {
                    path = header_path(rest);
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("+++ ") {
                // The new-side path wins when both headers are present
                if let Some(p) = header_path(rest) {
                    path = Some(p);
                }
                continue;
            }

            if line.starts_with("@@") {
                flush(&mut hunks, &mut current, &mut anchor);
                anchor = hunk_anchor(line);
                in_hunk = true;
                continue;
            }

            if !in_hunk {
                // Minimal diffs may omit @@; start collecting at the first
                // prefixed line
                if line.starts_with(' ')
                    || (line.starts_with('-') && !line.starts_with("---"))
                    || (line.starts_with('+') && !line.starts_with("+++"))
                {
                    in_hunk = true;
                } else {
                    continue;
                }
            }

            if is_elision(line) {
                current.push(DiffLine::elision());
            } else if let Some(content) = line.strip_prefix(' ') {
                current.push(DiffLine::context(content));
            } else if line.is_empty() {
                current.push(DiffLine::context(""));
            } else if line.starts_with('+') && !line.starts_with("+++") {
                current.push(DiffLine::add(&line[1..]));
            } else if line.starts_with('-') && !line.starts_with("---") {
                current.push(DiffLine::remove(&line[1..]));
            } else if line.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            } else {
                trace!(line, "ignoring unknown diff line");
            }
        }

        flush(&mut hunks, &mut current, &mut anchor);

        if hunks.is_empty() {
            return Err(PatchError::Grammar(
                "expected unified diff with @@ hunks or +/- lines with context".to_string(),
            ));
        }

        Ok(FileDiff {
            path: path.unwrap_or_else(|| default_path.to_string()),
            hunks,
        })
    }
}

/// Elision marker: `-...` with trailing whitespace tolerated.
fn is_elision(line: &str) -> bool {
    line.trim_end() == "-..."
}

fn header_path(rest: &str) -> Option<String> {
    let p = rest.trim();
    if p.is_empty() || p == "/dev/null" {
        return None;
    }
    let p = p.strip_prefix("a/").or_else(|| p.strip_prefix("b/")).unwrap_or(p);
    Some(p.to_string())
}

fn hunk_anchor(line: &str) -> Option<String> {
    let inner = line.trim_start_matches('@');
    let inner = inner.trim_end_matches('@');
    let inner = inner.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

fn flush(hunks: &mut Vec<Hunk>, current: &mut Vec<DiffLine>, anchor: &mut Option<String>) {
    // Trailing blank context lines are delimitation noise, not real context
    while matches!(current.last(), Some(l) if l.kind == LineKind::Context && l.content.is_empty())
    {
        current.pop();
    }
    if !current.is_empty() {
        hunks.push(Hunk {
            anchor: anchor.take(),
            lines: std::mem::take(current),
        });
    } else {
        *anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_hunk() {
        let body = "--- a/src/main.rs\n+++ b/src/main.rs\n@@ fn main @@\n fn main() {\n-    old();\n+    new();\n }\n";
        let diff = DiffParser::parse("fallback.rs", body).unwrap();
        assert_eq!(diff.path, "src/main.rs");
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.anchor.as_deref(), Some("fn main"));
        assert_eq!(
            hunk.lines,
            vec![
                DiffLine::context("fn main() {"),
                DiffLine::remove("    old();"),
                DiffLine::add("    new();"),
                DiffLine::context("}"),
            ]
        );
    }

    #[test]
    fn test_elision_marker_with_trailing_whitespace() {
        let body = "@@ @@\n-func F() {\n-...  \n-}\n+func F() { simplified() }\n";
        let diff = DiffParser::parse("f.go", body).unwrap();
        let hunk = &diff.hunks[0];
        assert!(hunk.has_elision());
        assert_eq!(hunk.lines[1], DiffLine::elision());
    }

    #[test]
    fn test_header_path_fallback() {
        let body = "@@ @@\n-a\n+b\n";
        let diff = DiffParser::parse("lib/util.py", body).unwrap();
        assert_eq!(diff.path, "lib/util.py");
    }

    #[test]
    fn test_implicit_hunk_without_header() {
        let body = " context\n-gone\n+here\n";
        let diff = DiffParser::parse("x", body).unwrap();
        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(diff.hunks[0].lines.len(), 3);
    }

    #[test]
    fn test_multiple_hunks() {
        let body = "@@ first @@\n-a\n+b\n@@ second @@\n-c\n+d\n";
        let diff = DiffParser::parse("x", body).unwrap();
        assert_eq!(diff.hunks.len(), 2);
        assert_eq!(diff.hunks[1].anchor.as_deref(), Some("second"));
    }

    #[test]
    fn test_blank_line_inside_hunk_is_empty_context() {
        let body = "@@ @@\n-a\n\n+b\n x\n";
        let diff = DiffParser::parse("x", body).unwrap();
        assert_eq!(diff.hunks[0].lines[1], DiffLine::context(""));
    }

    #[test]
    fn test_empty_body_is_grammar_error() {
        let err = DiffParser::parse("x", "nothing here\n").unwrap_err();
        assert!(matches!(err, PatchError::Grammar(_)));
    }

    #[test]
    fn test_crlf_lines_are_tolerated() {
        let body = "@@ @@\r\n-old\r\n+new\r\n";
        let diff = DiffParser::parse("x", body).unwrap();
        assert_eq!(diff.hunks[0].lines[0], DiffLine::remove("old"));
    }
}
