//! The line-oriented state machine over streamed chunks.

use tracing::{debug, trace};

use stitch_udiff::{DiffParser, FileDiff};

use crate::error::{Result, StreamError};

const SEARCH_OPEN: &str = "<<<<<<< SEARCH";
const DIVIDER: &str = "=======";
const REPLACE_CLOSE: &str = ">>>>>>> REPLACE";
const FILE_CLOSE: &str = "[/FILE]";
const ABOUT_OPEN: &str = "[ABOUT]";
const ABOUT_CLOSE: &str = "[/ABOUT]";

/// Where the parser currently is in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    InFile,
    InSearch,
    InReplace,
    InDiff,
    InAbout,
}

/// Running or permanently halted; halted always carries its error.
#[derive(Debug, Clone)]
enum ParserStatus {
    Running,
    Halted(StreamError),
}

/// Callbacks fired as grammar pieces complete. All run synchronously on the
/// feeding thread.
pub trait EditSink {
    fn on_file_start(&mut self, path: &str) {
        let _ = path;
    }

    /// Validation callback for a completed search block. Returning an error
    /// halts the parser permanently; this is the sole authority for halting.
    fn on_search_block(&mut self, path: &str, search: &str) -> std::result::Result<(), String> {
        let _ = (path, search);
        Ok(())
    }

    fn on_replace_block(&mut self, path: &str, search: &str, replace: &str) {
        let _ = (path, search, replace);
    }

    fn on_file_diff(&mut self, diff: &FileDiff) {
        let _ = diff;
    }

    fn on_about_text(&mut self, text: &str) {
        let _ = text;
    }

    fn on_file_complete(&mut self, path: &str) {
        let _ = path;
    }
}

/// Resumable parser over streamed edit-proposal text.
///
/// `feed` accepts chunks of any size down to a single byte; only complete
/// lines advance the state machine, and `finish` flushes a trailing
/// unterminated line. After a validation failure the parser is halted for
/// good: every later `feed` returns a clone of the stored error.
pub struct StreamParser<S> {
    sink: S,
    status: ParserStatus,
    state: ParserState,
    buffer: String,
    line_no: usize,
    current_file: Option<String>,
    pending_search: Option<String>,
    search_buf: Vec<String>,
    replace_buf: Vec<String>,
    diff_buf: Vec<String>,
    about_buf: Vec<String>,
}

impl<S: EditSink> StreamParser<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            status: ParserStatus::Running,
            state: ParserState::Idle,
            buffer: String::new(),
            line_no: 0,
            current_file: None,
            pending_search: None,
            search_buf: Vec::new(),
            replace_buf: Vec::new(),
            diff_buf: Vec::new(),
            about_buf: Vec::new(),
        }
    }

    /// Consume one chunk of streamed text.
    pub fn feed(&mut self, chunk: &str) -> Result<()> {
        if let ParserStatus::Halted(err) = &self.status {
            return Err(err.clone());
        }
        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            let _ = self.buffer.drain(..=pos);
            self.process_line(&line)?;
        }
        Ok(())
    }

    /// Signal end of stream: flush a trailing unterminated line and close
    /// whatever the model left open.
    pub fn finish(&mut self) -> Result<()> {
        if let ParserStatus::Halted(err) = &self.status {
            return Err(err.clone());
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.trim_end_matches('\r').to_string();
            self.process_line(&line)?;
        }

        match self.state {
            ParserState::Idle => Ok(()),
            ParserState::InAbout => {
                // The model frequently omits [/ABOUT] at end of stream
                self.emit_about();
                Ok(())
            }
            ParserState::InFile => {
                self.close_file();
                Ok(())
            }
            ParserState::InReplace => {
                self.emit_replace();
                self.close_file();
                Ok(())
            }
            ParserState::InDiff => {
                self.emit_diff()?;
                self.close_file();
                Ok(())
            }
            ParserState::InSearch => {
                Err(self.halt_grammar("stream ended inside an unterminated SEARCH block"))
            }
        }
    }

    /// Discard all progress and start over with the same sink.
    pub fn reset(&mut self) {
        self.status = ParserStatus::Running;
        self.state = ParserState::Idle;
        self.buffer.clear();
        self.line_no = 0;
        self.current_file = None;
        self.pending_search = None;
        self.search_buf.clear();
        self.replace_buf.clear();
        self.diff_buf.clear();
        self.about_buf.clear();
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.status, ParserStatus::Halted(_))
    }

    pub fn halt_error(&self) -> Option<&StreamError> {
        match &self.status {
            ParserStatus::Halted(err) => Some(err),
            ParserStatus::Running => None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn process_line(&mut self, line: &str) -> Result<()> {
        self.line_no += 1;
        trace!(line_no = self.line_no, state = ?self.state, "line");
        match self.state {
            ParserState::Idle => self.line_idle(line),
            ParserState::InFile => self.line_in_file(line),
            ParserState::InSearch => self.line_in_search(line),
            ParserState::InReplace => self.line_in_replace(line),
            ParserState::InDiff => self.line_in_diff(line),
            ParserState::InAbout => self.line_in_about(line),
        }
    }

    fn line_idle(&mut self, line: &str) -> Result<()> {
        let t = line.trim();
        if let Some(path) = file_open_path(t) {
            debug!(path, "file block opened");
            self.current_file = Some(path.to_string());
            self.state = ParserState::InFile;
            self.sink.on_file_start(path);
            return Ok(());
        }
        match t {
            ABOUT_OPEN => {
                self.about_buf.clear();
                self.state = ParserState::InAbout;
                Ok(())
            }
            FILE_CLOSE => Err(self.halt_grammar("[/FILE] without an open file block")),
            SEARCH_OPEN => Err(self.halt_grammar("SEARCH block outside a file block")),
            DIVIDER => Err(self.halt_grammar("divider outside a search block")),
            REPLACE_CLOSE => Err(self.halt_grammar("REPLACE terminator outside a search block")),
            // Prose, blank lines and code fences between blocks are noise
            _ => Ok(()),
        }
    }

    fn line_in_file(&mut self, line: &str) -> Result<()> {
        let t = line.trim();
        if t == SEARCH_OPEN {
            self.search_buf.clear();
            self.state = ParserState::InSearch;
            return Ok(());
        }
        if t == FILE_CLOSE {
            self.close_file();
            return Ok(());
        }
        if line.starts_with("--- ") || line.starts_with("@@") {
            self.diff_buf.clear();
            self.diff_buf.push(line.to_string());
            self.state = ParserState::InDiff;
            return Ok(());
        }
        if file_open_path(t).is_some() {
            return Err(self.halt_grammar("nested [FILE:] block"));
        }
        match t {
            ABOUT_OPEN => Err(self.halt_grammar("[ABOUT] inside a file block")),
            DIVIDER => Err(self.halt_grammar("divider without a SEARCH block")),
            REPLACE_CLOSE => Err(self.halt_grammar("REPLACE terminator without a SEARCH block")),
            _ => Ok(()),
        }
    }

    fn line_in_search(&mut self, line: &str) -> Result<()> {
        let t = line.trim_end();
        if t == DIVIDER {
            let path = self.current_file.clone().unwrap_or_default();
            let search = self.search_buf.join("\n");
            // Validate before advancing; the callback's error becomes the
            // permanent halt state.
            if let Err(reason) = self.sink.on_search_block(&path, &search) {
                let err = StreamError::Validation(reason);
                self.status = ParserStatus::Halted(err.clone());
                return Err(err);
            }
            self.pending_search = Some(search);
            self.replace_buf.clear();
            self.state = ParserState::InReplace;
            return Ok(());
        }
        if t == REPLACE_CLOSE {
            return Err(self.halt_grammar("REPLACE terminator before the ======= divider"));
        }
        if t.trim() == FILE_CLOSE {
            return Err(self.halt_grammar("[/FILE] inside an unterminated SEARCH block"));
        }
        self.search_buf.push(line.to_string());
        Ok(())
    }

    fn line_in_replace(&mut self, line: &str) -> Result<()> {
        let t = line.trim_end();
        if t == REPLACE_CLOSE {
            self.emit_replace();
            self.state = ParserState::InFile;
            return Ok(());
        }
        if t.trim() == FILE_CLOSE {
            // Model closed the file without terminating the pair; accept it
            self.emit_replace();
            self.close_file();
            return Ok(());
        }
        self.replace_buf.push(line.to_string());
        Ok(())
    }

    fn line_in_diff(&mut self, line: &str) -> Result<()> {
        let t = line.trim();
        if t == FILE_CLOSE {
            self.emit_diff()?;
            self.close_file();
            return Ok(());
        }
        if file_open_path(t).is_some() {
            return Err(self.halt_grammar("nested [FILE:] block inside a diff body"));
        }
        self.diff_buf.push(line.to_string());
        Ok(())
    }

    fn line_in_about(&mut self, line: &str) -> Result<()> {
        if line.trim() == ABOUT_CLOSE {
            self.emit_about();
            return Ok(());
        }
        self.about_buf.push(line.to_string());
        Ok(())
    }

    fn emit_replace(&mut self) {
        let path = self.current_file.clone().unwrap_or_default();
        let search = self.pending_search.take().unwrap_or_default();
        let replace = self.replace_buf.join("\n");
        self.replace_buf.clear();
        self.sink.on_replace_block(&path, &search, &replace);
    }

    fn emit_diff(&mut self) -> Result<()> {
        let path = self.current_file.clone().unwrap_or_default();
        let body = self.diff_buf.join("\n");
        self.diff_buf.clear();
        match DiffParser::parse(&path, &body) {
            Ok(diff) => {
                self.sink.on_file_diff(&diff);
                Ok(())
            }
            Err(err) => Err(self.halt_grammar(&err.to_string())),
        }
    }

    fn emit_about(&mut self) {
        let text = self.about_buf.join("\n");
        self.about_buf.clear();
        self.state = ParserState::Idle;
        self.sink.on_about_text(text.trim());
    }

    fn close_file(&mut self) {
        if let Some(path) = self.current_file.take() {
            self.sink.on_file_complete(&path);
        }
        self.pending_search = None;
        self.state = ParserState::Idle;
    }

    fn halt_grammar(&mut self, message: &str) -> StreamError {
        let err = StreamError::Grammar {
            line: self.line_no,
            message: message.to_string(),
        };
        self.status = ParserStatus::Halted(err.clone());
        err
    }
}

/// `[FILE: <path>]` → the path, trimmed.
fn file_open_path(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("[FILE:")?;
    let rest = rest.strip_suffix(']')?;
    let path = rest.trim();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every callback as one string, for order-sensitive asserts.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        reject_search: Option<String>,
    }

    impl EditSink for Recorder {
        fn on_file_start(&mut self, path: &str) {
            self.events.push(format!("start:{path}"));
        }

        fn on_search_block(
            &mut self,
            path: &str,
            search: &str,
        ) -> std::result::Result<(), String> {
            if let Some(reason) = &self.reject_search {
                return Err(reason.clone());
            }
            self.events.push(format!("search:{path}:{search}"));
            Ok(())
        }

        fn on_replace_block(&mut self, path: &str, search: &str, replace: &str) {
            self.events
                .push(format!("replace:{path}:{search}=>{replace}"));
        }

        fn on_file_diff(&mut self, diff: &FileDiff) {
            self.events
                .push(format!("diff:{}:{} hunks", diff.path, diff.hunks.len()));
        }

        fn on_about_text(&mut self, text: &str) {
            self.events.push(format!("about:{text}"));
        }

        fn on_file_complete(&mut self, path: &str) {
            self.events.push(format!("complete:{path}"));
        }
    }

    const SEARCH_REPLACE_DOC: &str = "\
[FILE: src/lib.rs]
<<<<<<< SEARCH
old line
=======
new line
>>>>>>> REPLACE
[/FILE]
[ABOUT]
Replaced a line.
[/ABOUT]
";

    fn run(doc: &str) -> Vec<String> {
        let mut parser = StreamParser::new(Recorder::default());
        parser.feed(doc).unwrap();
        parser.finish().unwrap();
        parser.into_sink().events
    }

    #[test]
    fn test_search_replace_block_event_order() {
        let events = run(SEARCH_REPLACE_DOC);
        assert_eq!(
            events,
            vec![
                "start:src/lib.rs",
                "search:src/lib.rs:old line",
                "replace:src/lib.rs:old line=>new line",
                "complete:src/lib.rs",
                "about:Replaced a line.",
            ]
        );
    }

    #[test]
    fn test_byte_at_a_time_feeding_is_equivalent() {
        let mut parser = StreamParser::new(Recorder::default());
        for b in SEARCH_REPLACE_DOC.chars() {
            parser.feed(&b.to_string()).unwrap();
        }
        parser.finish().unwrap();
        assert_eq!(parser.into_sink().events, run(SEARCH_REPLACE_DOC));
    }

    #[test]
    fn test_multiple_pairs_in_one_file_block() {
        let doc = "\
[FILE: a.py]
<<<<<<< SEARCH
one
=======
uno
>>>>>>> REPLACE
<<<<<<< SEARCH
two
=======
dos
>>>>>>> REPLACE
[/FILE]
";
        let events = run(doc);
        assert_eq!(
            events,
            vec![
                "start:a.py",
                "search:a.py:one",
                "replace:a.py:one=>uno",
                "search:a.py:two",
                "replace:a.py:two=>dos",
                "complete:a.py",
            ]
        );
    }

    #[test]
    fn test_diff_body_block() {
        let doc = "\
[FILE: src/main.go]
--- a/src/main.go
+++ b/src/main.go
@@ func main @@
 func main() {
-\told()
+\tnew()
 }
[/FILE]
";
        let events = run(doc);
        assert_eq!(
            events,
            vec![
                "start:src/main.go",
                "diff:src/main.go:1 hunks",
                "complete:src/main.go",
            ]
        );
    }

    #[test]
    fn test_unterminated_about_still_emits_on_finish() {
        let doc = "[ABOUT]\nSummary of edits.\n";
        let events = run(doc);
        assert_eq!(events, vec!["about:Summary of edits."]);
    }

    #[test]
    fn test_validation_failure_halts_permanently() {
        let sink = Recorder {
            reject_search: Some("no such text".to_string()),
            ..Default::default()
        };
        let mut parser = StreamParser::new(sink);
        let err = parser
            .feed("[FILE: x]\n<<<<<<< SEARCH\nbad\n=======\n")
            .unwrap_err();
        assert_eq!(err, StreamError::Validation("no such text".to_string()));
        assert!(parser.is_halted());

        // Every later feed is a no-op returning the same stored error
        let again = parser.feed("more\n").unwrap_err();
        assert_eq!(again, err);
        assert_eq!(parser.halt_error(), Some(&err));
        assert!(parser.into_sink().events.is_empty());
    }

    #[test]
    fn test_reset_clears_halt() {
        let sink = Recorder {
            reject_search: Some("nope".to_string()),
            ..Default::default()
        };
        let mut parser = StreamParser::new(sink);
        let _ = parser.feed("[FILE: x]\n<<<<<<< SEARCH\na\n=======\n");
        assert!(parser.is_halted());
        parser.reset();
        assert!(!parser.is_halted());
        assert_eq!(parser.state(), ParserState::Idle);
        parser.sink_mut().reject_search = None;
        parser.feed(SEARCH_REPLACE_DOC).unwrap();
        parser.finish().unwrap();
    }

    #[test]
    fn test_unterminated_search_is_grammar_error() {
        let mut parser = StreamParser::new(Recorder::default());
        parser.feed("[FILE: x]\n<<<<<<< SEARCH\nabc\n").unwrap();
        let err = parser.finish().unwrap_err();
        assert!(matches!(err, StreamError::Grammar { .. }));
    }

    #[test]
    fn test_stream_end_completes_open_replace() {
        let mut parser = StreamParser::new(Recorder::default());
        parser
            .feed("[FILE: x]\n<<<<<<< SEARCH\na\n=======\nb")
            .unwrap();
        parser.finish().unwrap();
        let events = parser.into_sink().events;
        assert_eq!(
            events,
            vec!["start:x", "search:x:a", "replace:x:a=>b", "complete:x"]
        );
    }

    #[test]
    fn test_prose_and_fences_between_blocks_are_ignored() {
        let doc = "\
Here is the change you asked for:
```
[FILE: x]
<<<<<<< SEARCH
a
=======
b
>>>>>>> REPLACE
[/FILE]
```
Done!
";
        let events = run(doc);
        assert_eq!(events[0], "start:x");
        assert_eq!(events.last().unwrap(), "complete:x");
    }

    #[test]
    fn test_orphan_delimiters_are_grammar_errors() {
        let mut parser = StreamParser::new(Recorder::default());
        assert!(matches!(
            parser.feed("=======\n"),
            Err(StreamError::Grammar { line: 1, .. })
        ));

        let mut parser = StreamParser::new(Recorder::default());
        assert!(matches!(
            parser.feed("[/FILE]\n"),
            Err(StreamError::Grammar { .. })
        ));
    }

    const MIXED_DOC: &str = "\
Making two edits.
[FILE: src/lib.rs]
<<<<<<< SEARCH
old line
=======
new line
>>>>>>> REPLACE
[/FILE]
[FILE: src/main.go]
--- a/src/main.go
+++ b/src/main.go
@@ func main @@
 func main() {
-\told()
+\tnew()
 }
[/FILE]
[ABOUT]
Two files touched.
[/ABOUT]
";

    proptest::proptest! {
        // Feeding the same document through any sequence of chunk splits
        // must produce the same callback sequence as one big feed.
        #[test]
        fn prop_chunk_splitting_is_invariant(
            splits in proptest::collection::vec(0usize..MIXED_DOC.len(), 0..12)
        ) {
            let mut points = splits;
            points.sort_unstable();
            points.dedup();

            let mut parser = StreamParser::new(Recorder::default());
            let mut prev = 0;
            for &p in &points {
                parser.feed(&MIXED_DOC[prev..p]).unwrap();
                prev = p;
            }
            parser.feed(&MIXED_DOC[prev..]).unwrap();
            parser.finish().unwrap();

            proptest::prop_assert_eq!(parser.into_sink().events, run(MIXED_DOC));
        }
    }

    #[test]
    fn test_current_file_tracking() {
        let mut parser = StreamParser::new(Recorder::default());
        parser.feed("[FILE: deep/path.rs]\n").unwrap();
        assert_eq!(parser.current_file(), Some("deep/path.rs"));
        assert_eq!(parser.state(), ParserState::InFile);
        parser.feed("[/FILE]\n").unwrap();
        assert_eq!(parser.current_file(), None);
        assert_eq!(parser.state(), ParserState::Idle);
    }
}
