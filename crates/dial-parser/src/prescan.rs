use std::collections::BTreeMap;

use dial_core::{DiagnosticSink, Pos, Severity};

use crate::source::ScriptBuffer;

pub type JumpBases = BTreeMap<i64, Pos>;

pub fn scan_jump_bases(buffer: &ScriptBuffer, sink: &dyn DiagnosticSink) -> JumpBases {
    let mut bases = JumpBases::new();
    let mut depth = 0usize;
    let mut at = 0usize;

    while !buffer.is_file_end(at) {
        match buffer.byte(at) {
            b'#' => at = buffer.seek_end_of_statement(at, b'#'),
            b'@' => at = buffer.seek_end_of_statement(at, b'@'),
            b'{' => {
                let range_start = at + 1;
                let inner = buffer.seek_until(range_start, b"{}");
                at = if buffer.byte(inner) == b'{' {
                    range_start
                } else {
                    inner + 1
                };
            }
            b'[' if buffer.byte(at + 1) == b'[' => {
                let number_start = at + 1;
                let (label_text, after_label) = buffer.scan_text_until(number_start, b"-_ ]");
                match label_text.parse::<i64>() {
                    Ok(label) => {
                        at = buffer.seek_until(number_start, b"]");
                        while buffer.byte(at) == b']' {
                            at += 1;
                        }
                        bases.insert(label, Pos::new(at, depth));
                    }
                    Err(_) => {
                        buffer.report(
                            sink,
                            Severity::Error,
                            "PRESCAN_BAD_LABEL",
                            format!("Jump base number could not be interpreted: {}", label_text),
                            number_start,
                        );
                        at = after_label;
                    }
                }
            }
            b'[' => at += 1,
            b'&' => {
                depth += 1;
                at = buffer.seek_end_of_statement(at, b'&');
            }
            b'|' if buffer.byte(at + 1) == b'|' => {
                if depth == 0 {
                    buffer.report(
                        sink,
                        Severity::Error,
                        "PRESCAN_NEGATIVE_DEPTH",
                        "Conditional nesting depth is below zero. There are stray '||' symbols.",
                        at,
                    );
                } else {
                    depth -= 1;
                }
                at += 2;
            }
            _ => at += 1,
        }
    }

    tracing::debug!(count = bases.len(), "jump bases scanned");
    bases
}

#[cfg(test)]
mod prescan_tests {
    use super::*;
    use dial_core::CollectingSink;

    fn scan(script: &str) -> (JumpBases, CollectingSink) {
        let sink = CollectingSink::new();
        let buffer = ScriptBuffer::load(script.as_bytes(), &sink).expect("script should load");
        let bases = scan_jump_bases(&buffer, &sink);
        (bases, sink)
    }

    #[test]
    fn records_labels_with_descriptions() {
        let script = "[[1]]A|[[20-intro]]B|[[7_scene]]C|[[6 plot]]D|~";
        let (bases, sink) = scan(script);
        assert_eq!(bases.len(), 4);
        assert_eq!(&script[bases[&1].offset..bases[&1].offset + 1], "A");
        assert_eq!(&script[bases[&20].offset..bases[&20].offset + 1], "B");
        assert_eq!(&script[bases[&7].offset..bases[&7].offset + 1], "C");
        assert_eq!(&script[bases[&6].offset..bases[&6].offset + 1], "D");
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn records_conditional_depth() {
        let (bases, _) = scan("&a&&b&[[3]]x||||[[4]]y|~");
        assert_eq!(bases[&3].depth, 2);
        assert_eq!(bases[&4].depth, 0);
    }

    #[test]
    fn skips_labels_inside_single_choices_and_instructions() {
        let (bases, _) = scan("{{[[9]]pick}}#x = 1#[[2]]z|~");
        assert!(!bases.contains_key(&9));
        assert!(bases.contains_key(&2));
    }

    #[test]
    fn bad_label_is_reported_and_skipped() {
        let (bases, sink) = scan("[[abc]]x[[5]]y|~");
        assert_eq!(bases.keys().copied().collect::<Vec<_>>(), vec![5]);
        assert!(sink.has_code("PRESCAN_BAD_LABEL"));
    }

    #[test]
    fn stops_at_file_end() {
        let (bases, _) = scan("x|~[[8]]");
        assert!(bases.is_empty());
    }
}
