use std::fs;
use std::path::{Path, PathBuf};

use dial_api::{MemoryScriptSource, SCRIPT_EXTENSION};
use walkdir::WalkDir;

use crate::{DialToolError, TestCase, TESTCASE_SCHEMA_V1};

pub const TESTCASE_FILE_NAME: &str = "testcase.json";

pub fn read_scripts_from_dir(case_dir: &Path) -> Result<MemoryScriptSource, DialToolError> {
    let mut source = MemoryScriptSource::new();
    let mut names = Vec::new();

    for entry in WalkDir::new(case_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SCRIPT_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
            continue;
        };
        if names.contains(&name) {
            return Err(DialToolError::DuplicateScript {
                name,
                path: case_dir.to_path_buf(),
            });
        }

        let content = fs::read(path).map_err(|source| DialToolError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        source.insert(name.clone(), content);
        names.push(name);
    }

    if names.is_empty() {
        return Err(DialToolError::SourceEmpty {
            path: case_dir.to_path_buf(),
        });
    }

    Ok(source)
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, DialToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| DialToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase =
        serde_json::from_str(&raw).map_err(|source| DialToolError::ParseCase {
            path: case_path.to_path_buf(),
            source,
        })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(DialToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}

pub fn discover_cases(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == TESTCASE_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect()
}
