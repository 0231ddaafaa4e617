use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "dial-case.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_seed")]
    pub seed: u32,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub expected_events: Vec<ExpectedEvent>,
}

fn default_script() -> String {
    "main".to_string()
}

fn default_seed() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TestAction {
    Continue,
    Choose { index: usize },
    Accent { delta: i32 },
    SaveLoad,
}

impl TestAction {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Choose { .. } => "choose",
            Self::Accent { .. } => "accent",
            Self::SaveLoad => "saveLoad",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExpectedEvent {
    Line {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        actor: String,
        text: String,
    },
    Choices {
        choices: Vec<String>,
    },
    End,
}
