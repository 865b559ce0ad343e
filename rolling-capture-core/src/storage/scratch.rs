//! Per-session scratch directory.
//!
//! ```text
//! {scratch_directory}/rolling-{uuid}/
//! ├── segments/segment_{index:06}_{epoch_millis}.{ext}
//! └── work/
//!     ├── candidate_{version:04}.{ext}
//!     ├── session_{generation:04}.{ext}
//!     └── {label}_{uuid}.{ext}
//! ```
//! Segment files and derived files live in sibling directories so their
//! names can never collide. Everything under the root is removed on stop.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;

#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
    segments: PathBuf,
    work: PathBuf,
    extension: String,
}

impl ScratchSpace {
    /// Create a fresh session directory under `parent`.
    pub fn create(parent: &Path, extension: &str) -> Result<Self, CaptureError> {
        let root = parent.join(format!("rolling-{}", uuid::Uuid::new_v4()));
        let segments = root.join("segments");
        let work = root.join("work");

        for dir in [&segments, &work] {
            fs::create_dir_all(dir).map_err(|e| {
                CaptureError::storage(&format!("failed to create {}", dir.display()), e)
            })?;
        }

        log::debug!("scratch space at {}", root.display());
        Ok(Self {
            root,
            segments,
            work,
            extension: extension.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn segment_path(&self, index: u64) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.segments
            .join(format!("segment_{:06}_{}.{}", index, millis, self.extension))
    }

    pub fn candidate_path(&self, version: u64) -> PathBuf {
        self.work
            .join(format!("candidate_{:04}.{}", version, self.extension))
    }

    /// Path of the continuous writer's file for one reset generation.
    pub fn session_path(&self, generation: u64) -> PathBuf {
        self.work
            .join(format!("session_{:04}.{}", generation, self.extension))
    }

    /// A unique path for an intermediate export.
    pub fn work_path(&self, label: &str) -> PathBuf {
        self.work.join(format!(
            "{}_{}.{}",
            label,
            uuid::Uuid::new_v4().simple(),
            self.extension
        ))
    }

    /// Remove the whole session directory. Already gone is not an error.
    pub fn destroy(&self) -> Result<(), CaptureError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaptureError::storage(
                &format!("failed to remove {}", self.root.display()),
                e,
            )),
        }
    }
}

/// Delete a scratch file, logging anything other than "already gone".
pub fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to delete {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_separates_segments_and_work() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();

        let segment = scratch.segment_path(7);
        let candidate = scratch.candidate_path(3);

        assert!(segment.parent().unwrap().ends_with("segments"));
        assert!(candidate.parent().unwrap().ends_with("work"));
        assert!(segment
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("segment_000007_"));
        assert_eq!(candidate.file_name().unwrap(), "candidate_0003.wav");
        assert_ne!(scratch.work_path("trim"), scratch.work_path("trim"));
    }

    #[test]
    fn sessions_get_distinct_roots() {
        let dir = TempDir::new().unwrap();
        let a = ScratchSpace::create(dir.path(), "wav").unwrap();
        let b = ScratchSpace::create(dir.path(), "wav").unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn destroy_removes_everything_and_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        fs::write(scratch.segment_path(0), b"x").unwrap();
        fs::write(scratch.candidate_path(0), b"y").unwrap();

        scratch.destroy().unwrap();
        assert!(!scratch.root().exists());
        scratch.destroy().unwrap();
    }

    #[test]
    fn remove_quietly_ignores_missing_files() {
        let dir = TempDir::new().unwrap();
        remove_quietly(&dir.path().join("missing.wav"));
    }
}
