//! JSON document persistence.
//!
//! Replacement writes go `write temp -> fsync -> rename -> fsync dir`, so a
//! reader (or a process restarted after a crash) sees either the old document
//! or the new one, never a torn file. Write-once documents use `create_new`
//! and refuse to overwrite.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::error::{GovError, GovResult};

/// Read and decode a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> GovResult<T> {
    let raw = fs::read(path).map_err(|e| GovError::io("read", path, e))?;
    serde_json::from_slice(&raw).map_err(|e| GovError::serde(path, e))
}

/// Encode `value` as pretty JSON bytes.
pub fn to_pretty<T: Serialize>(path: &Path, value: &T) -> GovResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| GovError::serde(path, e))
}

/// Atomically replace `path` with the JSON encoding of `value`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> GovResult<()> {
    let payload = to_pretty(path, value)?;
    write_bytes_atomic(path, &payload)
}

/// Atomically replace `path` with `payload`.
pub fn write_bytes_atomic(path: &Path, payload: &[u8]) -> GovResult<()> {
    let dir = parent_of(path)?;
    fs::create_dir_all(dir).map_err(|e| GovError::io("create_dir", dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let temp_path = dir.join(format!(".{file_name}.tmp.{}", Uuid::new_v4()));

    let result = (|| {
        let mut temp = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .map_err(|e| GovError::io("write_temp", &temp_path, e))?;
        temp.write_all(payload)
            .map_err(|e| GovError::io("write_temp", &temp_path, e))?;
        temp.sync_all()
            .map_err(|e| GovError::io("fsync_temp", &temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| GovError::io("rename", path, e))?;
        sync_dir(dir)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Write a document that must never be replaced once it exists.
pub fn write_json_new<T: Serialize>(path: &Path, value: &T) -> GovResult<()> {
    let payload = to_pretty(path, value)?;
    write_bytes_new(path, &payload)
}

/// Create `path` exclusively and fill it with `payload`.
pub fn write_bytes_new(path: &Path, payload: &[u8]) -> GovResult<()> {
    let dir = parent_of(path)?;
    fs::create_dir_all(dir).map_err(|e| GovError::io("create_dir", dir, e))?;
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .map_err(|e| GovError::io("create_new", path, e))?;
    file.write_all(payload)
        .map_err(|e| GovError::io("write", path, e))?;
    file.sync_all().map_err(|e| GovError::io("fsync", path, e))
}

/// Flush directory metadata so a completed rename survives power loss.
pub fn sync_dir(dir: &Path) -> GovResult<()> {
    let handle = File::open(dir).map_err(|e| GovError::io("fsync_dir", dir, e))?;
    handle
        .sync_all()
        .map_err(|e| GovError::io("fsync_dir", dir, e))
}

fn parent_of(path: &Path) -> GovResult<&Path> {
    path.parent()
        .ok_or_else(|| GovError::invalid(format!("{} has no parent directory", path.display())))
}
