use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::file_descriptor::FileDescriptor;

/// Path of the JSON sidecar for an output file: `{output}.metadata.json`.
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write the descriptor as a pretty-printed JSON sidecar next to its file.
pub fn write_metadata(descriptor: &FileDescriptor) -> Result<PathBuf, CaptureError> {
    let path = sidecar_path(&descriptor.path);
    let json = serde_json::to_string_pretty(descriptor)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::storage("failed to write metadata", e))?;
    Ok(path)
}

/// Read the sidecar written for `output`.
pub fn read_metadata(output: &Path) -> Result<FileDescriptor, CaptureError> {
    let json = fs::read_to_string(sidecar_path(output))
        .map_err(|e| CaptureError::storage("failed to read metadata", e))?;
    serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}
