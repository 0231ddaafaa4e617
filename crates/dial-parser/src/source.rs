use dial_core::{DialError, Diagnostic, DiagnosticSink, Severity, SourceLocation};

pub const FILE_END: &str = "|~";

const COMMENT_FILLER: u8 = b'\t';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBuffer {
    bytes: Vec<u8>,
    file_end: usize,
}

impl ScriptBuffer {
    pub fn load(raw: &[u8], sink: &dyn DiagnosticSink) -> Result<Self, DialError> {
        if raw.len() < FILE_END.len() {
            let error = DialError::new(
                "SCRIPT_TOO_SHORT",
                "A script needs at least the file ending symbol '|~'.",
            );
            sink.report(&Diagnostic::error("SCRIPT_TOO_SHORT", error.message.clone()));
            return Err(error);
        }

        let bytes = strip_comments(raw);
        let issues = check_balance(&bytes);
        for issue in &issues {
            let mut diagnostic = Diagnostic::error(issue.code, issue.message.clone());
            if let Some(offset) = issue.offset {
                diagnostic = diagnostic.at(SourceLocation::from_offset(&bytes, offset));
            }
            sink.report(&diagnostic);
        }
        if let Some(issue) = issues.into_iter().next() {
            let mut error = DialError::new(issue.code, issue.message);
            error.location = issue
                .offset
                .map(|offset| SourceLocation::from_offset(&bytes, offset));
            return Err(error);
        }

        let file_end = find_file_end(&bytes).unwrap_or(bytes.len());
        tracing::debug!(bytes = bytes.len(), file_end, "script buffer loaded");
        Ok(Self { bytes, file_end })
    }

    pub fn fragment(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        let file_end = bytes.len();
        bytes.extend_from_slice(FILE_END.as_bytes());
        Self { bytes, file_end }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_end(&self) -> usize {
        self.file_end
    }

    pub fn byte(&self, at: usize) -> u8 {
        self.bytes.get(at).copied().unwrap_or(0)
    }

    pub fn location(&self, at: usize) -> SourceLocation {
        SourceLocation::from_offset(&self.bytes, at)
    }

    pub fn report(
        &self,
        sink: &dyn DiagnosticSink,
        severity: Severity,
        code: &'static str,
        message: impl Into<String>,
        at: usize,
    ) {
        sink.report(&Diagnostic::new(severity, code, message).at(self.location(at)));
    }
}

pub fn strip_comments(raw: &[u8]) -> Vec<u8> {
    let mut bytes = raw.to_vec();
    let mut block_depth = 0usize;
    let mut in_line_comment = false;
    let mut i = 0;
    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        if in_line_comment {
            if bytes[i] == b'\n' {
                in_line_comment = false;
            } else {
                bytes[i] = COMMENT_FILLER;
            }
            i += 1;
            continue;
        }

        match (bytes[i], next) {
            (b'/', Some(b'*')) => {
                block_depth += 1;
                bytes[i] = COMMENT_FILLER;
                bytes[i + 1] = COMMENT_FILLER;
                i += 2;
            }
            (b'*', Some(b'/')) if block_depth > 0 => {
                block_depth -= 1;
                bytes[i] = COMMENT_FILLER;
                bytes[i + 1] = COMMENT_FILLER;
                i += 2;
            }
            (b'/', Some(b'/')) if block_depth == 0 => {
                in_line_comment = true;
                bytes[i] = COMMENT_FILLER;
                bytes[i + 1] = COMMENT_FILLER;
                i += 2;
            }
            _ => {
                if block_depth > 0 {
                    bytes[i] = COMMENT_FILLER;
                }
                i += 1;
            }
        }
    }
    bytes
}

fn find_file_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == FILE_END.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BalanceIssue {
    code: &'static str,
    message: String,
    offset: Option<usize>,
}

impl BalanceIssue {
    fn new(code: &'static str, message: &str, offset: Option<usize>) -> Self {
        Self {
            code,
            message: message.to_string(),
            offset,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Delimiter {
    open: bool,
    count: usize,
    last: Option<usize>,
}

impl Delimiter {
    fn toggle(&mut self, at: usize) {
        self.open = !self.open;
        self.count += 1;
        self.last = Some(at);
    }

    fn open_at(&mut self, at: usize) {
        self.open = true;
        self.count += 1;
        self.last = Some(at);
    }
}

fn check_balance(bytes: &[u8]) -> Vec<BalanceIssue> {
    let mut variable = Delimiter::default();
    let mut special = Delimiter::default();
    let mut persistent = Delimiter::default();
    let mut conditional = Delimiter::default();
    let mut jump = Delimiter::default();
    let mut choice_open = Delimiter::default();
    let mut choice_close = 0usize;
    let mut scope_close = 0usize;
    let mut has_file_end = false;

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => variable.toggle(i),
            b'@' => special.toggle(i),
            b'$' => persistent.toggle(i),
            b'&' => conditional.toggle(i),
            b'[' => {
                jump.open = true;
                jump.last = Some(i);
            }
            b']' => jump.open = false,
            b'{' => choice_open.open_at(i),
            b'}' => {
                choice_open.open = false;
                choice_close += 1;
            }
            b'|' => match bytes.get(i + 1) {
                Some(b'~') => {
                    has_file_end = true;
                    break;
                }
                Some(b'|') => {
                    scope_close += 1;
                    i += 1;
                }
                _ => {}
            },
            _ => {}
        }
        i += 1;
    }

    let mut issues = Vec::new();
    if !has_file_end {
        issues.push(BalanceIssue::new(
            "SCRIPT_NO_FILE_END",
            "The script doesn't have the file ending symbol '|~'.",
            None,
        ));
    }
    if conditional.open {
        issues.push(BalanceIssue::new(
            "SCRIPT_UNCLOSED_CONDITIONAL",
            "A conditional instruction doesn't have its closing '&'.",
            conditional.last,
        ));
    } else if conditional.count > scope_close * 2 {
        issues.push(BalanceIssue::new(
            "SCRIPT_MISSING_SCOPE_END",
            "There are not enough conditional scope ending '||' symbols.",
            conditional.last,
        ));
    } else if conditional.count < scope_close * 2 {
        issues.push(BalanceIssue::new(
            "SCRIPT_EXTRA_SCOPE_END",
            "There are too many conditional scope ending '||' symbols.",
            None,
        ));
    }
    if variable.open {
        issues.push(BalanceIssue::new(
            "SCRIPT_UNCLOSED_VARIABLE",
            "A variable instruction doesn't have its closing '#'.",
            variable.last,
        ));
    }
    if special.open {
        issues.push(BalanceIssue::new(
            "SCRIPT_UNCLOSED_SPECIAL",
            "A special instruction doesn't have its closing '@'.",
            special.last,
        ));
    }
    if persistent.open {
        issues.push(BalanceIssue::new(
            "SCRIPT_UNCLOSED_PERSISTENT",
            "A persistent conditional doesn't have its closing '$'.",
            persistent.last,
        ));
    }
    if jump.open {
        issues.push(BalanceIssue::new(
            "SCRIPT_UNCLOSED_JUMP",
            "A jump point or jump base is missing its ']' symbol.",
            jump.last,
        ));
    }
    if choice_open.open {
        issues.push(BalanceIssue::new(
            "SCRIPT_UNCLOSED_CHOICE",
            "A choice range is missing its '}' symbol.",
            choice_open.last,
        ));
    } else if choice_open.count != choice_close {
        issues.push(BalanceIssue::new(
            "SCRIPT_CHOICE_MISMATCH",
            "The number of '{' and '}' symbols in choices and choice ranges differs.",
            choice_open.last,
        ));
    }
    issues
}

#[cfg(test)]
mod source_tests {
    use super::*;
    use dial_core::CollectingSink;

    #[test]
    fn comments_are_blanked_in_place() {
        let raw = b"a/* x /* y */ z */b// note\nc|~";
        let stripped = strip_comments(raw);
        assert_eq!(stripped.len(), raw.len());
        let visible: String = stripped
            .iter()
            .filter(|byte| **byte != b'\t')
            .map(|byte| *byte as char)
            .collect();
        assert_eq!(visible, "ab\nc|~");
    }

    #[test]
    fn balanced_script_loads() {
        let sink = CollectingSink::new();
        let buffer = ScriptBuffer::load(b"&x > 1&Hi||#x = 2#{{Yes}{No}}|~", &sink)
            .expect("balanced script should load");
        assert_eq!(buffer.file_end(), buffer.len() - 2);
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn missing_file_end_fails_construction() {
        let sink = CollectingSink::new();
        let error = ScriptBuffer::load(b"Hello|", &sink).expect_err("no sentinel");
        assert_eq!(error.code, "SCRIPT_NO_FILE_END");
        assert!(sink.has_code("SCRIPT_NO_FILE_END"));
    }

    #[test]
    fn every_imbalance_is_reported_and_first_returned() {
        let sink = CollectingSink::new();
        let error = ScriptBuffer::load(b"&a&Hi #x = 1 {{A}|~", &sink)
            .expect_err("unbalanced script");
        assert_eq!(error.code, "SCRIPT_MISSING_SCOPE_END");
        assert_eq!(
            sink.codes(),
            vec![
                "SCRIPT_MISSING_SCOPE_END",
                "SCRIPT_UNCLOSED_VARIABLE",
                "SCRIPT_CHOICE_MISMATCH"
            ]
        );
        assert!(error.location.is_some());
    }

    #[test]
    fn text_after_file_end_is_not_checked() {
        let sink = CollectingSink::new();
        assert!(ScriptBuffer::load(b"Done|~ {{{ &", &sink).is_ok());
        assert_eq!(
            ScriptBuffer::load(b"x", &sink).expect_err("too short").code,
            "SCRIPT_TOO_SHORT"
        );
    }

    #[test]
    fn fragment_appends_file_end() {
        let fragment = ScriptBuffer::fragment("&a&x||");
        assert_eq!(fragment.bytes(), b"&a&x|||~");
        assert_eq!(fragment.file_end(), 6);
    }

    #[test]
    fn stray_scope_end_is_critical() {
        let sink = CollectingSink::new();
        let error = ScriptBuffer::load(b"Hi||there|~", &sink).expect_err("stray ||");
        assert_eq!(error.code, "SCRIPT_EXTRA_SCOPE_END");
    }
}
