use dial_core::{DiagnosticSink, Severity};

use crate::source::ScriptBuffer;
use crate::text::normalize_whitespace;

pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

impl ScriptBuffer {
    pub fn is_file_end(&self, at: usize) -> bool {
        at >= self.len() || (self.byte(at) == b'|' && self.byte(at + 1) == b'~')
    }

    pub fn skip_whitespace(&self, at: usize) -> usize {
        let mut at = at;
        while is_whitespace(self.byte(at)) {
            at += 1;
        }
        at
    }

    pub fn seek_until(&self, at: usize, set: &[u8]) -> usize {
        let bytes = self.bytes();
        let mut at = at;
        while at < bytes.len() && !set.contains(&bytes[at]) {
            at += 1;
        }
        at
    }

    pub fn seek_end_of_statement(&self, at: usize, closer: u8) -> usize {
        let close = self.seek_until(at + 1, &[closer]);
        (close + 1).min(self.len())
    }

    pub fn seek_end_of_conditional(&self, at: usize, sink: &dyn DiagnosticSink) -> usize {
        let mut depth = 0usize;
        let mut at = at;
        loop {
            at = self.seek_until(at, b"&|");
            if self.is_file_end(at) {
                self.report(
                    sink,
                    Severity::Error,
                    "RUNTIME_UNCLOSED_SCOPE",
                    "A conditional doesn't have its corresponding '||' symbol.",
                    at,
                );
                return at.min(self.len());
            }
            if self.byte(at) == b'&' {
                depth += 1;
                at = self.seek_end_of_statement(at, b'&');
            } else if self.byte(at + 1) == b'|' {
                at += 2;
                if depth == 0 {
                    return at;
                }
                depth -= 1;
            } else {
                at += 1;
            }
        }
    }

    pub fn seek_end_of_choice_range(&self, at: usize, sink: &dyn DiagnosticSink) -> usize {
        let mut depth = 0usize;
        let mut last_choice_end = at;
        let mut at = at;
        loop {
            at = self.seek_until(at, b"{}|");
            if self.is_file_end(at) {
                self.report(
                    sink,
                    Severity::Error,
                    "RUNTIME_STRAY_CHOICE",
                    "The choice isn't in any choice range.",
                    last_choice_end,
                );
                return last_choice_end;
            }
            match self.byte(at) {
                b'{' => {
                    at = self.seek_until(at + 1, b"{}");
                    match self.byte(at) {
                        b'{' => {
                            depth += 1;
                            at = self.seek_end_of_statement(at, b'}');
                        }
                        b'}' => {
                            at += 1;
                            last_choice_end = at;
                        }
                        _ => {}
                    }
                }
                b'}' => {
                    at += 1;
                    if depth == 0 {
                        return at;
                    }
                    depth -= 1;
                }
                _ => at += 1,
            }
        }
    }

    pub fn scan_text_until(&self, at: usize, set: &[u8]) -> (String, usize) {
        let start = (at + 1).min(self.len());
        let end = self.seek_until(start, set);
        let body = String::from_utf8_lossy(&self.bytes()[start..end]);
        (normalize_whitespace(&body), (end + 1).min(self.len()))
    }

    pub fn is_conditional_choice(&self, at: usize) -> bool {
        let mut at = self.skip_whitespace(at);
        while self.byte(at) == b'&' {
            at = self.seek_end_of_statement(at, b'&');
            at = self.skip_whitespace(at);
        }
        if self.byte(at) != b'{' {
            return false;
        }
        let inner = self.seek_until(at + 1, b"{}");
        self.byte(inner) == b'}'
    }
}

#[cfg(test)]
mod scan_tests {
    use dial_core::CollectingSink;

    use crate::source::ScriptBuffer;

    fn load(script: &str) -> ScriptBuffer {
        ScriptBuffer::load(script.as_bytes(), &CollectingSink::new()).expect("script should load")
    }

    #[test]
    fn seek_until_stops_on_set_member() {
        let buffer = load("abc#d#|~");
        assert_eq!(buffer.seek_until(0, b"#"), 3);
        assert_eq!(buffer.seek_end_of_statement(3, b'#'), 6);
        assert_eq!(buffer.seek_until(0, b"%"), buffer.len());
    }

    #[test]
    fn end_of_conditional_skips_nested_scopes() {
        let script = "&a&x&b&y||z||after|~";
        let buffer = load(script);
        let sink = CollectingSink::new();
        let end = buffer.seek_end_of_conditional(3, &sink);
        assert_eq!(&script[end..], "after|~");
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn end_of_conditional_reports_missing_close() {
        let script = "&a&x||y|~";
        let buffer = load(script);
        let sink = CollectingSink::new();
        let end = buffer.seek_end_of_conditional(6, &sink);
        assert_eq!(&script[end..], "|~");
        assert!(sink.has_code("RUNTIME_UNCLOSED_SCOPE"));
    }

    #[test]
    fn end_of_choice_range_skips_nested_ranges() {
        let script = "{{a}{{b}{c}}{d}}after|~";
        let buffer = load(script);
        let sink = CollectingSink::new();
        let end = buffer.seek_end_of_choice_range(4, &sink);
        assert_eq!(&script[end..], "after|~");
    }

    #[test]
    fn stray_choice_falls_back_to_last_choice_end() {
        let script = "{a} text |~";
        let buffer = load(script);
        let sink = CollectingSink::new();
        assert_eq!(buffer.seek_end_of_choice_range(3, &sink), 3);
        assert!(sink.has_code("RUNTIME_STRAY_CHOICE"));
    }

    #[test]
    fn scan_text_normalizes_body() {
        let buffer = load("#  x   =\n 5 #rest|~");
        let (body, next) = buffer.scan_text_until(0, b"#");
        assert_eq!(body, "x = 5 ");
        assert_eq!(buffer.byte(next), b'r');
    }

    #[test]
    fn conditional_choice_lookahead() {
        let guarded = load("&a& &b& {Yes}||||{{A}}|~");
        assert!(guarded.is_conditional_choice(3));
        let dialogue = load("&a& Hello||{{A}}|~");
        assert!(!dialogue.is_conditional_choice(3));
        let range = load("&a&{{A}}||{{B}}|~");
        assert!(!range.is_conditional_choice(3));
    }
}
