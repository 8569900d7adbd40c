//! Apply parsed hunks to file content with flexible matching.

use tracing::debug;

use crate::error::{PatchError, Result};
use crate::parser::{DiffLine, Hunk, LineKind};
use crate::scan::scan_line;

/// What went wrong (non-fatally) while applying a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Anchor matched several locations, first match was used
    AmbiguousAnchor,
    /// Elision scan hit end of file without the scope closing
    UnclosedScope,
    /// Hunk could not be placed and was skipped
    HunkSkipped,
}

/// A non-fatal condition reported by [`DiffApplier::apply_with_warnings`].
#[derive(Debug, Clone)]
pub struct ApplyWarning {
    /// Index of the hunk the warning belongs to
    pub hunk: usize,
    pub kind: WarningKind,
    pub message: String,
}

/// Applier for parsed diff hunks.
///
/// Hunks are located with exact line matching first, then with per-line
/// whitespace-stripped matching. Hunks containing an elision marker resolve
/// the elided span by scanning brace depth forward from the opening anchor
/// line; braces inside strings, char literals, raw strings and comments do
/// not count.
pub struct DiffApplier;

impl DiffApplier {
    /// Apply all hunks, treating every warning condition as a hard error.
    pub fn apply(content: &str, hunks: &[Hunk]) -> Result<String> {
        let (new_content, _) = apply_inner(content, hunks, true)?;
        Ok(new_content)
    }

    /// Apply all hunks best-effort.
    ///
    /// A hunk that cannot be placed is skipped with one warning and its
    /// target region is left untouched; remaining hunks still apply. Never
    /// fails.
    pub fn apply_with_warnings(content: &str, hunks: &[Hunk]) -> (String, Vec<ApplyWarning>) {
        match apply_inner(content, hunks, false) {
            Ok(result) => result,
            // Unreachable in lenient mode, but keep the signature honest
            Err(err) => (
                content.to_string(),
                vec![ApplyWarning {
                    hunk: 0,
                    kind: WarningKind::HunkSkipped,
                    message: err.to_string(),
                }],
            ),
        }
    }
}

fn apply_inner(
    content: &str,
    hunks: &[Hunk],
    strict: bool,
) -> Result<(String, Vec<ApplyWarning>)> {
    // Normalize line endings so CRLF input cannot break line matching
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let had_trailing_newline = normalized.ends_with('\n');
    let mut lines: Vec<String> = normalized.lines().map(str::to_string).collect();

    let mut warnings = Vec::new();
    for (idx, hunk) in hunks.iter().enumerate() {
        match apply_hunk(&mut lines, idx, hunk) {
            Ok(hunk_warnings) => {
                if strict {
                    if let Some(w) = hunk_warnings.into_iter().next() {
                        return Err(promote(w));
                    }
                } else {
                    warnings.extend(hunk_warnings);
                }
            }
            Err(err) => {
                if strict {
                    return Err(err);
                }
                debug!(hunk = idx, %err, "skipping hunk");
                warnings.push(ApplyWarning {
                    hunk: idx,
                    kind: WarningKind::HunkSkipped,
                    message: err.to_string(),
                });
            }
        }
    }

    let mut out = lines.join("\n");
    if had_trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    Ok((out, warnings))
}

fn promote(w: ApplyWarning) -> PatchError {
    match w.kind {
        WarningKind::AmbiguousAnchor => PatchError::AmbiguousAnchor {
            index: w.hunk,
            detail: w.message,
        },
        WarningKind::UnclosedScope => PatchError::UnclosedScope { index: w.hunk },
        WarningKind::HunkSkipped => PatchError::HunkFailed {
            index: w.hunk,
            detail: w.message,
        },
    }
}

fn apply_hunk(lines: &mut Vec<String>, idx: usize, hunk: &Hunk) -> Result<Vec<ApplyWarning>> {
    if hunk.has_elision() {
        apply_elision_hunk(lines, idx, hunk)
    } else {
        apply_plain_hunk(lines, idx, hunk)
    }
}

/// Context and Remove contents, in order: the text the hunk expects to find.
fn anchor_lines(hunk_lines: &[DiffLine]) -> Vec<&str> {
    hunk_lines
        .iter()
        .filter(|l| matches!(l.kind, LineKind::Context | LineKind::Remove))
        .map(|l| l.content.as_str())
        .collect()
}

fn window_matches(lines: &[String], at: usize, seq: &[&str]) -> bool {
    at + seq.len() <= lines.len() && seq.iter().enumerate().all(|(k, s)| lines[at + k] == *s)
}

fn window_matches_stripped(lines: &[String], at: usize, seq: &[&str]) -> bool {
    at + seq.len() <= lines.len()
        && seq
            .iter()
            .enumerate()
            .all(|(k, s)| lines[at + k].trim() == s.trim())
}

fn window_matches_loose(lines: &[String], at: usize, seq: &[&str]) -> bool {
    window_matches(lines, at, seq) || window_matches_stripped(lines, at, seq)
}

/// All start indices where `seq` matches, exact first, stripped as fallback.
fn find_occurrences(lines: &[String], seq: &[&str], from: usize) -> Vec<usize> {
    if seq.is_empty() || lines.len() < seq.len() {
        return Vec::new();
    }
    let last = lines.len() - seq.len();
    let exact: Vec<usize> = (from..=last)
        .filter(|&i| window_matches(lines, i, seq))
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    (from..=last)
        .filter(|&i| window_matches_stripped(lines, i, seq))
        .collect()
}

/// Rewrite one matched window: Context keeps the original line, Remove drops
/// it, Add inserts the hunk's line.
fn render_window(lines: &[String], at: usize, hunk_lines: &[DiffLine]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = at;
    for l in hunk_lines {
        match l.kind {
            LineKind::Context => {
                out.push(lines[cursor].clone());
                cursor += 1;
            }
            LineKind::Remove => cursor += 1,
            LineKind::Add => out.push(l.content.clone()),
            LineKind::Elision => {}
        }
    }
    out
}

fn apply_plain_hunk(
    lines: &mut Vec<String>,
    idx: usize,
    hunk: &Hunk,
) -> Result<Vec<ApplyWarning>> {
    let seq = anchor_lines(&hunk.lines);
    if seq.is_empty() {
        return Err(PatchError::HunkFailed {
            index: idx,
            detail: "hunk has no context or removed lines to anchor on".to_string(),
        });
    }

    let occurrences = find_occurrences(lines, &seq, 0);
    if occurrences.is_empty() {
        return Err(PatchError::HunkFailed {
            index: idx,
            detail: format!("context lines not found in file:\n{}", seq.join("\n")),
        });
    }

    let mut warnings = Vec::new();
    if occurrences.len() > 1 {
        warnings.push(ApplyWarning {
            hunk: idx,
            kind: WarningKind::AmbiguousAnchor,
            message: format!(
                "anchor matches {} locations, applied at line {}",
                occurrences.len(),
                occurrences[0] + 1
            ),
        });
    }

    let at = occurrences[0];
    let replacement = render_window(lines, at, &hunk.lines);
    let _ = lines.splice(at..at + seq.len(), replacement);
    Ok(warnings)
}

fn apply_elision_hunk(
    lines: &mut Vec<String>,
    idx: usize,
    hunk: &Hunk,
) -> Result<Vec<ApplyWarning>> {
    let e = hunk
        .lines
        .iter()
        .position(|l| l.kind == LineKind::Elision)
        .expect("caller checked has_elision");
    if hunk.lines[e + 1..].iter().any(|l| l.kind == LineKind::Elision) {
        return Err(PatchError::HunkFailed {
            index: idx,
            detail: "hunk contains more than one elision marker".to_string(),
        });
    }

    let prefix = &hunk.lines[..e];
    let suffix = &hunk.lines[e + 1..];
    let seq_p = anchor_lines(prefix);
    let seq_s = anchor_lines(suffix);
    if seq_p.is_empty() {
        return Err(PatchError::HunkFailed {
            index: idx,
            detail: "elision has no opening anchor lines".to_string(),
        });
    }

    // The elided span follows the disposition of its opening flank: a Remove
    // flank drops the span, a Context flank keeps it.
    let flank_kind = prefix
        .iter()
        .rev()
        .find(|l| matches!(l.kind, LineKind::Context | LineKind::Remove))
        .map(|l| l.kind)
        .expect("seq_p is non-empty");

    let occurrences = find_occurrences(lines, &seq_p, 0);
    if occurrences.is_empty() {
        return Err(PatchError::HunkFailed {
            index: idx,
            detail: format!("context lines not found in file:\n{}", seq_p.join("\n")),
        });
    }

    let mut selected: Option<(usize, usize)> = None;
    let mut selected_warning: Option<ApplyWarning> = None;
    let mut consistent = 0usize;

    for &at in &occurrences {
        let open_idx = at + seq_p.len() - 1;
        let opened = scan_line(0, &lines[open_idx]);

        let resolved = if opened > 0 {
            resolve_by_scan(lines, idx, open_idx, opened, &seq_s)
        } else {
            // Opening flank does not open a scope; the trailing anchor alone
            // bounds the elision.
            find_occurrences(lines, &seq_s, at + seq_p.len())
                .first()
                .map(|&p| (p, None))
        };

        if let Some((sfx_at, warning)) = resolved {
            consistent += 1;
            if selected.is_none() {
                selected = Some((at, sfx_at));
                selected_warning = warning;
            }
        }
    }

    let (at, sfx_at) = selected.ok_or_else(|| PatchError::HunkFailed {
        index: idx,
        detail: format!(
            "could not resolve elided region; trailing lines not found:\n{}",
            seq_s.join("\n")
        ),
    })?;

    let mut warnings = Vec::new();
    if consistent > 1 {
        warnings.push(ApplyWarning {
            hunk: idx,
            kind: WarningKind::AmbiguousAnchor,
            message: format!(
                "{} occurrences are consistent with the elision anchors, applied at line {}",
                consistent,
                at + 1
            ),
        });
    }
    if let Some(w) = selected_warning {
        warnings.push(w);
    }

    let mut replacement = render_window(lines, at, prefix);
    if flank_kind == LineKind::Context {
        replacement.extend(lines[at + seq_p.len()..sfx_at].iter().cloned());
    }
    replacement.extend(render_window(lines, sfx_at, suffix));
    let _ = lines.splice(at..sfx_at + seq_s.len(), replacement);
    Ok(warnings)
}

/// Brace-scan forward from the line after `open_idx` until depth returns to
/// zero; place the suffix anchor so its scope-closing line lands on that
/// boundary. Returns the suffix start and an optional unclosed-scope warning.
fn resolve_by_scan(
    lines: &[String],
    idx: usize,
    open_idx: usize,
    opened: i32,
    seq_s: &[&str],
) -> Option<(usize, Option<ApplyWarning>)> {
    let mut depth = opened;
    let mut boundary = None;
    for (j, line) in lines.iter().enumerate().skip(open_idx + 1) {
        depth = scan_line(depth, line);
        if depth <= 0 {
            boundary = Some(j);
            break;
        }
    }

    match boundary {
        Some(b) => {
            if seq_s.is_empty() {
                // No trailing anchor: the elision absorbs the closing line too
                return Some((b + 1, None));
            }
            // Which suffix line closes the scope, judged on the hunk's own text
            let sfx_at = match closing_offset(seq_s, opened) {
                Some(k) if b >= k => b - k,
                Some(_) => return None,
                None => b + 1,
            };
            if sfx_at > open_idx && window_matches_loose(lines, sfx_at, seq_s) {
                Some((sfx_at, None))
            } else {
                None
            }
        }
        None => {
            // Scope never closed. Fall back to locating the trailing anchor
            // anywhere after the prefix, then to end-of-file.
            if !seq_s.is_empty() {
                return find_occurrences(lines, seq_s, open_idx + 1)
                    .first()
                    .map(|&p| (p, None));
            }
            let warning = ApplyWarning {
                hunk: idx,
                kind: WarningKind::UnclosedScope,
                message: format!(
                    "scope opened at line {} never returns to depth zero, eliding to end of file",
                    open_idx + 1
                ),
            };
            Some((lines.len(), Some(warning)))
        }
    }
}

/// Offset within the suffix anchor of the line that closes the scope opened
/// by the prefix flank, judged by scanning the hunk's own lines.
fn closing_offset(seq_s: &[&str], opened: i32) -> Option<usize> {
    let mut depth = opened;
    for (k, line) in seq_s.iter().enumerate() {
        depth = scan_line(depth, line);
        if depth <= 0 {
            return Some(k);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DiffLine;

    fn hunk(lines: Vec<DiffLine>) -> Hunk {
        Hunk::new(lines)
    }

    #[test]
    fn test_apply_simple_hunk() {
        let content = "fn main() {\n    println!(\"Hello\");\n}\n";
        let h = hunk(vec![
            DiffLine::context("fn main() {"),
            DiffLine::remove("    println!(\"Hello\");"),
            DiffLine::add("    println!(\"Hello, world!\");"),
            DiffLine::context("}"),
        ]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert_eq!(out, "fn main() {\n    println!(\"Hello, world!\");\n}\n");
    }

    #[test]
    fn test_apply_multiple_hunks_in_order() {
        let content = "fn first() {\n    let x = 1;\n}\nfn second() {\n    let y = 3;\n}\n";
        let hunks = vec![
            hunk(vec![
                DiffLine::context("fn first() {"),
                DiffLine::remove("    let x = 1;"),
                DiffLine::add("    let x = 2;"),
            ]),
            hunk(vec![
                DiffLine::context("fn second() {"),
                DiffLine::remove("    let y = 3;"),
                DiffLine::add("    let y = 4;"),
            ]),
        ];
        let out = DiffApplier::apply(content, &hunks).unwrap();
        assert!(out.contains("let x = 2;"));
        assert!(out.contains("let y = 4;"));
    }

    #[test]
    fn test_stripped_match_keeps_original_context_text() {
        // Hunk lost the indentation; context line in the output must keep
        // the file's own whitespace.
        let content = "    if ready {\n        go();\n    }\n";
        let h = hunk(vec![
            DiffLine::context("if ready {"),
            DiffLine::remove("go();"),
            DiffLine::add("launch();"),
            DiffLine::context("}"),
        ]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert!(out.starts_with("    if ready {"));
        assert!(out.contains("launch();"));
        assert!(out.ends_with("    }\n"));
    }

    #[test]
    fn test_elision_replaces_whole_function_body() {
        let content = "func F() {\n  a()\n  b()\n}\n\nfunc G() {}\n";
        let h = hunk(vec![
            DiffLine::remove("func F() {"),
            DiffLine::elision(),
            DiffLine::remove("}"),
            DiffLine::add("func F() { simplified() }"),
        ]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert!(out.contains("simplified()"));
        assert!(out.contains("func G()"));
        assert!(!out.contains("a()"));
        assert!(!out.contains("b()"));
    }

    #[test]
    fn test_elision_skips_brace_inside_string() {
        let content = "func F() {\n  fmt.Println(\"}\")\n  tail()\n}\nfunc G() {}\n";
        let h = hunk(vec![
            DiffLine::remove("func F() {"),
            DiffLine::elision(),
            DiffLine::remove("}"),
            DiffLine::add("func F() {}"),
        ]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert!(out.contains("func F() {}"));
        assert!(out.contains("func G() {}"));
        assert!(!out.contains("tail()"));
    }

    #[test]
    fn test_elision_trailing_anchor_disambiguates_identical_signatures() {
        // Two identical signatures; the trailing anchor names the second
        // body, so only the second function may change.
        let content = "func H() {\n  one()\n}\nfunc H() {\n  two()\n}\n";
        let h = hunk(vec![
            DiffLine::remove("func H() {"),
            DiffLine::elision(),
            DiffLine::remove("  two()"),
            DiffLine::remove("}"),
            DiffLine::add("func H() { fixed() }"),
        ]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert!(out.contains("func H() {\n  one()\n}\n"));
        assert!(out.contains("fixed()"));
        assert!(!out.contains("two()"));
    }

    #[test]
    fn test_elision_first_consistent_occurrence_wins() {
        // Both occurrences are consistent with the trailing anchor; the
        // first one is picked. This is a known heuristic, not a guarantee
        // of intent, so lenient apply reports it instead of guessing
        // silently.
        let content = "func H() {\n  x()\n}\nfunc H() {\n  x()\n}\n";
        let h = hunk(vec![
            DiffLine::remove("func H() {"),
            DiffLine::elision(),
            DiffLine::remove("}"),
            DiffLine::add("func H() { y() }"),
        ]);
        let (out, warnings) = DiffApplier::apply_with_warnings(content, &[h]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::AmbiguousAnchor);
        assert!(out.starts_with("func H() { y() }\n"));
        assert!(out.contains("func H() {\n  x()\n}\n"));
    }

    #[test]
    fn test_elision_with_context_flank_keeps_span() {
        let content = "setup()\nstep1()\nstep2()\nteardown()\n";
        let h = hunk(vec![
            DiffLine::context("setup()"),
            DiffLine::elision(),
            DiffLine::context("teardown()"),
            DiffLine::add("report()"),
        ]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert_eq!(out, "setup()\nstep1()\nstep2()\nteardown()\nreport()\n");
    }

    #[test]
    fn test_elision_unclosed_scope_falls_back_to_eof() {
        let content = "func F() {\n  a()\n  b()\n";
        let h = hunk(vec![DiffLine::remove("func F() {"), DiffLine::elision()]);
        let (out, warnings) = DiffApplier::apply_with_warnings(content, &[h]);
        assert_eq!(out, "");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnclosedScope);
    }

    #[test]
    fn test_strict_apply_rejects_ambiguous_anchor() {
        let content = "a\nb\na\nb\n";
        let h = hunk(vec![DiffLine::remove("a"), DiffLine::add("c")]);
        let err = DiffApplier::apply(content, &[h]).unwrap_err();
        assert!(matches!(err, PatchError::AmbiguousAnchor { index: 0, .. }));
    }

    #[test]
    fn test_lenient_apply_warns_on_ambiguous_anchor() {
        let content = "a\nb\na\nb\n";
        let h = hunk(vec![DiffLine::remove("a"), DiffLine::add("c")]);
        let (out, warnings) = DiffApplier::apply_with_warnings(content, &[h]);
        assert_eq!(out, "c\nb\na\nb\n");
        assert_eq!(warnings[0].kind, WarningKind::AmbiguousAnchor);
    }

    #[test]
    fn test_mismatched_hunk_is_skipped_with_one_warning() {
        let content = "fn main() {\n    run();\n}\n";
        let hunks = vec![
            hunk(vec![DiffLine::remove("nonexistent"), DiffLine::add("x")]),
            hunk(vec![
                DiffLine::remove("    run();"),
                DiffLine::add("    walk();"),
            ]),
        ];
        let (out, warnings) = DiffApplier::apply_with_warnings(content, &hunks);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::HunkSkipped);
        assert_eq!(warnings[0].hunk, 0);
        // The good hunk still applied; the bad hunk's region is untouched
        assert_eq!(out, "fn main() {\n    walk();\n}\n");
    }

    #[test]
    fn test_strict_apply_fails_on_mismatched_hunk() {
        let content = "fn main() {}\n";
        let h = hunk(vec![DiffLine::remove("nope"), DiffLine::add("x")]);
        let err = DiffApplier::apply(content, &[h]).unwrap_err();
        assert!(matches!(err, PatchError::HunkFailed { index: 0, .. }));
    }

    #[test]
    fn test_crlf_content_is_normalized() {
        let content = "alpha\r\nbeta\r\n";
        let h = hunk(vec![DiffLine::remove("beta"), DiffLine::add("gamma")]);
        let out = DiffApplier::apply(content, &[h]).unwrap();
        assert_eq!(out, "alpha\ngamma\n");
    }

    #[test]
    fn test_apply_does_not_mutate_input() {
        let content = "one\ntwo\n".to_string();
        let h = hunk(vec![DiffLine::remove("one"), DiffLine::add("uno")]);
        let _ = DiffApplier::apply(&content, &[h.clone()]).unwrap();
        assert_eq!(content, "one\ntwo\n");
        // Re-running with identical inputs is deterministic
        let a = DiffApplier::apply(&content, &[h.clone()]).unwrap();
        let b = DiffApplier::apply(&content, &[h]).unwrap();
        assert_eq!(a, b);
    }
}
