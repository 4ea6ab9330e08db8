//! JSON file persistence for client-local state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Read `path` as JSON, returning `None` when the file does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)
        .map_err(|e| Error::Storage(format!("failed to read {}: {}", path.display(), e)))?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Storage(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(value))
}

/// Write `value` to `path` as pretty-printed JSON, creating parent directories.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Storage(format!("failed to create dir {}: {}", parent.display(), e))
        })?;
    }
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Storage(format!("failed to serialize: {}", e)))?;
    fs::write(path, bytes)
        .map_err(|e| Error::Storage(format!("failed to write {}: {}", path.display(), e)))
}

pub fn default_data_dir() -> PathBuf {
    let mut dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("dock");
    dir
}

pub fn default_templates_path() -> PathBuf {
    default_data_dir().join("templates.json")
}
