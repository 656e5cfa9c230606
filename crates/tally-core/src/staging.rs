//! Per-request staging storage for files handed to the OCR backend.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// File name of the staged image inside a staging directory.
const SOURCE_NAME: &str = "source.png";

/// A uniquely named directory owned by one request.
///
/// The directory and everything in it is removed when the value is dropped,
/// including when the owning future is cancelled. Names inside it derive from
/// the request id, never from user-supplied filenames.
#[derive(Debug)]
pub struct StagingArea {
    request_id: Uuid,
    dir: TempDir,
}

impl StagingArea {
    /// Create a staging directory for `request_id` under `root`.
    pub fn create(root: &Path, request_id: Uuid) -> std::io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("tally-{}-", request_id))
            .tempdir_in(root)?;
        debug!("Created staging area {}", dir.path().display());
        Ok(Self { request_id, dir })
    }

    /// Request this area belongs to.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path a staged image lives at. Fixed, so backends that pick the
    /// decoder from the extension always see `.png`.
    pub fn source_path(&self) -> PathBuf {
        self.dir.path().join(SOURCE_NAME)
    }

    /// Write PNG bytes to [`Self::source_path`].
    pub fn stage_png(&self, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.source_path();
        fs::write(&path, bytes)?;
        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> std::io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().inspect_err(|e| {
            warn!("Failed to remove staging area {}: {}", path.display(), e);
        })
    }
}
