use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DialError;
use crate::value::Value;

pub const SAVE_LOG_SCHEMA: &str = "dial-save.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LogEntry {
    Script { name: String },
    Seed { seed: u32 },
    Var { name: String, value: Value },
    Accent { name: String },
    Continue,
    Choice { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLog {
    pub schema_version: String,
    pub entries: Vec<LogEntry>,
}

impl Default for SaveLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveLog {
    pub fn new() -> Self {
        Self {
            schema_version: SAVE_LOG_SCHEMA.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn script_name(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            LogEntry::Script { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn seed(&self) -> Option<u32> {
        self.entries.iter().find_map(|entry| match entry {
            LogEntry::Seed { seed } => Some(*seed),
            _ => None,
        })
    }

    pub fn validate_schema(&self) -> Result<(), DialError> {
        if self.schema_version != SAVE_LOG_SCHEMA {
            return Err(DialError::new(
                "LOAD_SCHEMA",
                format!("Unsupported save schema \"{}\".", self.schema_version),
            ));
        }
        Ok(())
    }
}

pub fn encode_flat(log: &SaveLog) -> String {
    let mut out = String::new();
    for entry in &log.entries {
        let raw = match entry {
            LogEntry::Script { name } => format!("f:{}", name),
            LogEntry::Seed { seed } => format!("s:{}", seed),
            LogEntry::Var { name, value } => format!("v:{} = {}", name, value.to_literal()),
            LogEntry::Accent { name } => format!("a:{}", name),
            LogEntry::Continue => "0".to_string(),
            LogEntry::Choice { index } => index.to_string(),
        };
        for ch in raw.chars() {
            if ch == ',' || ch == '\\' {
                out.push('\\');
            }
            out.push(ch);
        }
        out.push(',');
    }
    out
}

pub fn decode_flat(raw: &str) -> Result<SaveLog, DialError> {
    let mut log = SaveLog::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ',' => {
                log.push(decode_flat_entry(&current)?);
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if !current.trim().is_empty() {
        return Err(DialError::new(
            "LOAD_TRUNCATED",
            format!("Save data ends with an unterminated entry \"{}\".", current),
        ));
    }

    Ok(log)
}

fn decode_flat_entry(raw: &str) -> Result<LogEntry, DialError> {
    let entry = raw.trim_start_matches(['\r', '\n']);
    if entry.is_empty() {
        return Err(DialError::new("LOAD_EMPTY_ENTRY", "Save data has an empty entry."));
    }

    let Some((tag, body)) = entry.split_once(':') else {
        return match entry.parse::<usize>() {
            Ok(0) => Ok(LogEntry::Continue),
            Ok(index) => Ok(LogEntry::Choice { index }),
            Err(_) => Err(DialError::new(
                "LOAD_UNKNOWN_ENTRY",
                format!("Unrecognized save entry \"{}\".", entry),
            )),
        };
    };

    match tag {
        "f" if !body.is_empty() => Ok(LogEntry::Script {
            name: body.to_string(),
        }),
        "s" => body
            .parse::<u32>()
            .map(|seed| LogEntry::Seed { seed })
            .map_err(|_| {
                DialError::new("LOAD_SEED", format!("Invalid seed entry \"{}\".", entry))
            }),
        "v" => decode_var_entry(entry),
        "a" if !body.is_empty() => Ok(LogEntry::Accent {
            name: body.to_string(),
        }),
        _ => Err(DialError::new(
            "LOAD_UNKNOWN_ENTRY",
            format!("Unrecognized save entry \"{}\".", entry),
        )),
    }
}

fn decode_var_entry(entry: &str) -> Result<LogEntry, DialError> {
    let invalid = || DialError::new("LOAD_VAR", format!("Invalid variable entry \"{}\".", entry));
    let captures = var_entry_regex().captures(entry).ok_or_else(invalid)?;
    let name = captures[1].to_string();
    let literal = &captures[2];

    let value = if literal.len() >= 2 && literal.starts_with('"') && literal.ends_with('"') {
        Value::Text(literal[1..literal.len() - 1].to_string())
    } else {
        Value::Int(literal.parse::<i64>().map_err(|_| invalid())?)
    };

    Ok(LogEntry::Var { name, value })
}

fn var_entry_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^v:([^\s=]+) = (.*)$").expect("var entry regex"))
}

#[cfg(test)]
mod save_log_tests {
    use super::*;

    fn sample() -> SaveLog {
        let mut log = SaveLog::new();
        log.push(LogEntry::Script {
            name: "chapter_one".to_string(),
        });
        log.push(LogEntry::Seed { seed: 1234 });
        log.push(LogEntry::Var {
            name: "Gold".to_string(),
            value: Value::Int(-5),
        });
        log.push(LogEntry::Var {
            name: "Title".to_string(),
            value: Value::from("Sir, the \\ brave"),
        });
        log.push(LogEntry::Continue);
        log.push(LogEntry::Accent {
            name: "polite".to_string(),
        });
        log.push(LogEntry::Choice { index: 2 });
        log
    }

    #[test]
    fn flat_encoding_matches_legacy_layout() {
        let encoded = encode_flat(&sample());
        assert_eq!(
            encoded,
            "f:chapter_one,s:1234,v:Gold = -5,v:Title = \"Sir\\, the \\\\ brave\",0,a:polite,2,"
        );
        assert_eq!(decode_flat(&encoded).expect("flat log should decode"), sample());
    }

    #[test]
    fn script_name_uses_delimiter_not_offsets() {
        let log = decode_flat("f:a,s:1,").expect("short name should decode");
        assert_eq!(log.script_name(), Some("a"));
        assert_eq!(log.seed(), Some(1));
    }

    #[test]
    fn decode_rejects_bad_entries() {
        assert_eq!(decode_flat("f:x,,").unwrap_err().code, "LOAD_EMPTY_ENTRY");
        assert_eq!(decode_flat("q:1,").unwrap_err().code, "LOAD_UNKNOWN_ENTRY");
        assert_eq!(decode_flat("s:abc,").unwrap_err().code, "LOAD_SEED");
        assert_eq!(decode_flat("v:X = five,").unwrap_err().code, "LOAD_VAR");
        assert_eq!(decode_flat("f:x,0").unwrap_err().code, "LOAD_TRUNCATED");
        assert!(decode_flat("f:x,0,\n").is_ok());
    }

    #[test]
    fn json_round_trip_is_tagged() {
        let encoded = serde_json::to_string(&sample()).expect("log should serialize");
        assert!(encoded.contains(r#""schemaVersion":"dial-save.v1""#));
        assert!(encoded.contains(r#"{"kind":"continue"}"#));
        let decoded: SaveLog = serde_json::from_str(&encoded).expect("log should parse");
        assert_eq!(decoded, sample());
        assert!(decoded.validate_schema().is_ok());
    }
}
