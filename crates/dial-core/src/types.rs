use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn from_offset(buffer: &[u8], offset: usize) -> Self {
        let end = offset.min(buffer.len());
        let mut line = 1usize;
        let mut column = 1usize;
        for byte in &buffer[..end] {
            if *byte == b'\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub offset: usize,
    pub depth: usize,
}

impl Pos {
    pub fn new(offset: usize, depth: usize) -> Self {
        Self { offset, depth }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    None,
    WaitForContinuation,
    WaitForChoice,
    Interpret,
    FatalError,
    Finished,
}

impl Status {
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::WaitForContinuation | Self::WaitForChoice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextKind {
    Normal,
    ChoiceNormal,
    ChoiceSelected,
    ChoiceAccented,
    ChoiceChance,
}

impl TextKind {
    pub fn is_choice_listing(self) -> bool {
        matches!(
            self,
            Self::ChoiceNormal | Self::ChoiceAccented | Self::ChoiceChance
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextObject {
    pub actor_name: String,
    pub text: String,
    pub kind: TextKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceObject {
    pub instruction_text: String,
    pub display_text: String,
    pub kind: TextKind,
    pub accent_variants: BTreeMap<String, String>,
    pub resume: Pos,
}

impl ChoiceObject {
    pub fn is_one_use(&self) -> bool {
        self.instruction_text.starts_with('~')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum HostRequest {
    Save,
    Wait(u32),
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn location_counts_lines_and_columns() {
        let buffer = b"ab\ncd\nef";
        assert_eq!(
            SourceLocation::from_offset(buffer, 0),
            SourceLocation { line: 1, column: 1 }
        );
        assert_eq!(
            SourceLocation::from_offset(buffer, 4),
            SourceLocation { line: 2, column: 2 }
        );
        assert_eq!(
            SourceLocation::from_offset(buffer, 99),
            SourceLocation { line: 3, column: 3 }
        );
    }

    #[test]
    fn choice_listing_kinds() {
        assert!(TextKind::ChoiceAccented.is_choice_listing());
        assert!(!TextKind::ChoiceSelected.is_choice_listing());
        assert!(!TextKind::Normal.is_choice_listing());
        assert!(Status::WaitForChoice.is_waiting());
        assert!(!Status::Interpret.is_waiting());
    }
}
