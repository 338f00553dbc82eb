//! Invocation-scoped temporary files.
//!
//! A `StagedFile` owns one path on local disk and deletes it exactly once:
//! either through `release` (which reports failures) or when it is dropped
//! on any other exit path.
//!
//! The `Drop` path unlinks with blocking `std::fs::remove_file` on whatever
//! thread drops the guard. A single unlink does not stall a runtime worker
//! noticeably; call `release` where an async delete matters.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    /// Create a new, uniquely named empty file under `dir` and return it
    /// together with a write handle.
    ///
    /// The name is `<prefix>-<uuid><ext>`; creation fails rather than
    /// truncating if the name is somehow taken.
    pub async fn create(dir: &Path, prefix: &str, ext: &str) -> io::Result<(Self, File)> {
        let path = dir.join(format!("{}-{}{}", prefix, Uuid::new_v4(), ext));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!("staged {}", path.display());
        Ok((Self::adopt(path), file))
    }

    /// Take ownership of an existing file, e.g. one written by an external tool.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. A file that is already gone is not an error.
    pub async fn release(mut self) -> io::Result<()> {
        self.armed = false;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("released {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("failed to remove staged file {}: {}", self.path.display(), err),
        }
    }
}
