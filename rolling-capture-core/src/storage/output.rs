//! Delivery of the final output file.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;

/// Name for a new output file in `output_directory`.
pub fn output_path(output_directory: &Path, extension: &str) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    output_directory.join(format!("rolling_{}_{}.{}", stamp, &suffix[..8], extension))
}

/// Move `source` out of scratch to `destination`.
///
/// Falls back to copy-and-delete when the two live on different filesystems.
pub fn deliver(source: &Path, destination: &Path) -> Result<(), CaptureError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CaptureError::storage("failed to create output directory", e))?;
    }

    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }

    if let Err(e) = fs::copy(source, destination) {
        let _ = fs::remove_file(destination);
        return Err(CaptureError::storage("failed to copy output", e));
    }
    if let Err(e) = fs::remove_file(source) {
        log::warn!("copied output but failed to delete {}: {}", source.display(), e);
    }
    Ok(())
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file =
        File::open(path).map_err(|e| CaptureError::storage("failed to open for checksum", e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CaptureError::storage("failed to read for checksum", e)),
        }
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
