use dial_core::{Diagnostic, DiagnosticSink};

use crate::scan::is_whitespace;

pub fn normalize_whitespace(text: &str) -> String {
    let trimmed = text.trim_start_matches(|ch: char| ch.is_ascii() && is_whitespace(ch as u8));
    let mut out = String::with_capacity(trimmed.len());
    let mut previous_space = false;
    for ch in trimmed.chars() {
        let ch = match ch {
            '\n' | '\r' => ' ',
            '\t' => continue,
            other => other,
        };
        if ch == ' ' {
            if previous_space {
                continue;
            }
            previous_space = true;
        } else {
            previous_space = false;
        }
        out.push(ch);
    }
    out
}

pub fn is_visible(text: &str) -> bool {
    text.bytes().any(|byte| !is_whitespace(byte))
}

fn escape_replacement(code: char) -> Option<char> {
    let replacement = match code {
        'A' => '&',
        'B' => '\\',
        'C' => '%',
        'D' => '$',
        'H' => '#',
        'J' => '\u{2060}',
        'M' => '@',
        'N' => '\u{00A0}',
        'P' => '|',
        'S' => ' ',
        'T' => '~',
        '1' => '[',
        '2' => ']',
        '3' => '{',
        '4' => '}',
        ':' => ':',
        _ => return None,
    };
    Some(replacement)
}

pub fn apply_escapes(text: &str, sink: &dyn DiagnosticSink) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(code) = chars.next() else {
            break;
        };
        match escape_replacement(code) {
            Some(replacement) => out.push(replacement),
            None => sink.report(&Diagnostic::error(
                "TEXT_UNKNOWN_ESCAPE",
                format!("Unknown special character '\\{}'.", code),
            )),
        }
    }
    out
}

pub fn wrap_text(text: &str, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + text.len() / width.max(1));
    let mut column = 0usize;
    for word in text.split_inclusive(' ') {
        let mut chars: Vec<char> = word.chars().collect();
        let visible = chars.iter().filter(|ch| **ch != ' ').count();
        if column > 0 && column + visible > width {
            out.push('\n');
            column = 0;
        }

        while chars.iter().filter(|ch| **ch != ' ').count() > width {
            let take = if width >= 2 { width - 1 } else { width };
            let chunk: String = chars.drain(..take).collect();
            let ends_with_hyphen = chunk.ends_with('-');
            out.push_str(&chunk);
            if width >= 2 && !ends_with_hyphen {
                out.push('-');
            }
            out.push('\n');
        }

        column += chars.len();
        out.extend(chars);
    }
    out
}
