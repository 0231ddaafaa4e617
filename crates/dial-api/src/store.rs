use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dial_core::{decode_flat, encode_flat, DialError, SaveLog};

use crate::source::check_script_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Json,
    Flat,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Flat => "txt",
        }
    }

    pub fn encode(self, log: &SaveLog) -> Result<String, DialError> {
        match self {
            Self::Json => serde_json::to_string_pretty(log).map_err(|error| {
                DialError::new("SAVE_ENCODE", format!("Failed to encode save log: {}", error))
            }),
            Self::Flat => Ok(encode_flat(log)),
        }
    }

    pub fn decode(self, raw: &str) -> Result<SaveLog, DialError> {
        match self {
            Self::Json => serde_json::from_str(raw).map_err(|error| {
                DialError::new("LOAD_DECODE", format!("Failed to decode save log: {}", error))
            }),
            Self::Flat => decode_flat(raw),
        }
    }
}

pub trait SaveStore {
    fn write(&mut self, name: &str, slot: u32, log: &SaveLog) -> Result<(), DialError>;
    fn read(&self, name: &str, slot: u32) -> Result<SaveLog, DialError>;
}

#[derive(Debug, Clone)]
pub struct DirSaveStore {
    root: PathBuf,
    format: SaveFormat,
}

impl DirSaveStore {
    pub fn new(root: impl Into<PathBuf>, format: SaveFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> SaveFormat {
        self.format
    }

    pub fn slot_path(&self, name: &str, slot: u32) -> PathBuf {
        self.root
            .join(format!("save_{}_{}.{}", name, slot, self.format.extension()))
    }
}

impl SaveStore for DirSaveStore {
    fn write(&mut self, name: &str, slot: u32, log: &SaveLog) -> Result<(), DialError> {
        check_script_name(name)?;
        let encoded = self.format.encode(log)?;
        fs::create_dir_all(&self.root).map_err(|error| {
            DialError::new(
                "SAVE_WRITE",
                format!("Failed to create {}: {}", self.root.display(), error),
            )
        })?;
        let path = self.slot_path(name, slot);
        fs::write(&path, encoded).map_err(|error| {
            DialError::new(
                "SAVE_WRITE",
                format!("Failed to write {}: {}", path.display(), error),
            )
        })
    }

    fn read(&self, name: &str, slot: u32) -> Result<SaveLog, DialError> {
        check_script_name(name)?;
        let path = self.slot_path(name, slot);
        let raw = fs::read_to_string(&path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => DialError::new(
                "LOAD_NOT_FOUND",
                format!("No save for \"{}\" in slot {}.", name, slot),
            ),
            _ => DialError::new(
                "LOAD_READ",
                format!("Failed to read {}: {}", path.display(), error),
            ),
        })?;
        self.format.decode(&raw)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySaveStore {
    slots: BTreeMap<(String, u32), SaveLog>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl SaveStore for MemorySaveStore {
    fn write(&mut self, name: &str, slot: u32, log: &SaveLog) -> Result<(), DialError> {
        self.slots.insert((name.to_string(), slot), log.clone());
        Ok(())
    }

    fn read(&self, name: &str, slot: u32) -> Result<SaveLog, DialError> {
        self.slots
            .get(&(name.to_string(), slot))
            .cloned()
            .ok_or_else(|| {
                DialError::new(
                    "LOAD_NOT_FOUND",
                    format!("No save for \"{}\" in slot {}.", name, slot),
                )
            })
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use dial_core::LogEntry;

    fn sample_log() -> SaveLog {
        let mut log = SaveLog::new();
        log.push(LogEntry::Script {
            name: "intro".to_string(),
        });
        log.push(LogEntry::Seed { seed: 12 });
        log.push(LogEntry::Continue);
        log
    }

    #[test]
    fn slot_paths_follow_the_format() {
        let json = DirSaveStore::new("saves", SaveFormat::Json);
        assert_eq!(
            json.slot_path("intro", 2),
            Path::new("saves").join("save_intro_2.json")
        );
        let flat = DirSaveStore::new("saves", SaveFormat::Flat);
        assert_eq!(
            flat.slot_path("intro", 0),
            Path::new("saves").join("save_intro_0.txt")
        );
    }

    #[test]
    fn json_encoding_is_tagged_by_kind() {
        let encoded = SaveFormat::Json.encode(&sample_log()).expect("encode");
        assert!(encoded.contains("\"schemaVersion\": \"dial-save.v1\""));
        assert!(encoded.contains("\"kind\": \"continue\""));
        assert_eq!(SaveFormat::Json.decode(&encoded).expect("decode"), sample_log());
        assert_eq!(
            SaveFormat::Json.decode("{").expect_err("broken json").code,
            "LOAD_DECODE"
        );
    }

    #[test]
    fn memory_store_keeps_slots_apart() {
        let mut store = MemorySaveStore::new();
        store.write("intro", 1, &sample_log()).expect("write");
        assert_eq!(store.len(), 1);
        assert_eq!(store.read("intro", 1).expect("read"), sample_log());
        assert_eq!(
            store.read("intro", 2).expect_err("empty slot").code,
            "LOAD_NOT_FOUND"
        );
    }
}
