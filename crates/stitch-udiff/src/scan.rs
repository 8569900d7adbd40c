//! Brace-depth scanning over single lines of source code.

/// Advance a brace-nesting depth across one line of code.
///
/// Counts `{` and `}` while skipping anything inside string literals
/// (`"..."` with backslash escapes), char literals (`'...'`), raw
/// backtick-delimited strings, line comments (`//`) and block comments
/// opened and closed on the same line. A string or block comment left
/// unterminated at end of line swallows the remainder of that line.
pub fn scan_line(depth: i32, line: &str) -> i32 {
    let mut depth = depth;
    let mut chars = line.chars().peekable();

    'outer: while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                // Quoted literal with backslash escapes.
                loop {
                    match chars.next() {
                        Some('\\') => {
                            chars.next();
                        }
                        Some(q) if q == c => break,
                        Some(_) => {}
                        None => break 'outer,
                    }
                }
            }
            '`' => {
                // Raw string: no escapes, runs to the next backtick.
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(_) => {}
                        None => break 'outer,
                    }
                }
            }
            '/' => match chars.peek() {
                Some('/') => break,
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    loop {
                        match chars.next() {
                            Some('/') if prev == '*' => break,
                            Some(n) => prev = n,
                            None => break 'outer,
                        }
                    }
                }
                _ => {}
            },
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }

    depth
}
