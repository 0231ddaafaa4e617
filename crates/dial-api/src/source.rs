use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dial_core::DialError;

pub const SCRIPT_EXTENSION: &str = "dial";

pub trait ScriptSource {
    fn read_script(&self, name: &str) -> Result<Vec<u8>, DialError>;
}

#[derive(Debug, Clone)]
pub struct DirScriptSource {
    root: PathBuf,
}

impl DirScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn script_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, SCRIPT_EXTENSION))
    }
}

impl ScriptSource for DirScriptSource {
    fn read_script(&self, name: &str) -> Result<Vec<u8>, DialError> {
        check_script_name(name)?;
        let path = self.script_path(name);
        fs::read(&path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => DialError::new(
                "SOURCE_NOT_FOUND",
                format!("Script \"{}\" not found at {}.", name, path.display()),
            ),
            _ => DialError::new(
                "SOURCE_READ",
                format!("Failed to read {}: {}", path.display(), error),
            ),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryScriptSource {
    scripts: BTreeMap<String, Vec<u8>>,
}

impl MemoryScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, script: impl Into<Vec<u8>>) {
        self.scripts.insert(name.into(), script.into());
    }

    pub fn with_script(mut self, name: impl Into<String>, script: impl Into<Vec<u8>>) -> Self {
        self.insert(name, script);
        self
    }
}

impl ScriptSource for MemoryScriptSource {
    fn read_script(&self, name: &str) -> Result<Vec<u8>, DialError> {
        self.scripts.get(name).cloned().ok_or_else(|| {
            DialError::new(
                "SOURCE_NOT_FOUND",
                format!("Script \"{}\" is not registered.", name),
            )
        })
    }
}

pub(crate) fn check_script_name(name: &str) -> Result<(), DialError> {
    if name.is_empty() || name.contains(['/', '\\', ',']) || name.starts_with('.') {
        return Err(DialError::new(
            "SOURCE_SCRIPT_NAME",
            format!("Invalid script name \"{}\".", name),
        ));
    }
    Ok(())
}
