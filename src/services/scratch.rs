use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What `safe_remove` ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    RemovedFile,
    RemovedDirectory,
    /// Nothing existed at the path
    Missing,
    /// Removal was attempted and failed; the reason has already been logged
    Failed { reason: String },
}

/// Creates `path` and any missing parents. Succeeds if it already exists.
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)?;
    debug!("Scratch directory ready: {}", path.display());
    Ok(())
}

/// Best-effort removal of a file or directory tree.
///
/// Never returns an error: a missing path, a permission failure, or any other
/// I/O problem is logged and reported through the returned [`Removal`].
pub fn safe_remove(path: &Path) -> Removal {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Path does not exist: {}", path.display());
            return Removal::Missing;
        }
        Err(e) => return report_failure(path, e),
    };

    if metadata.is_dir() {
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                info!("Successfully removed directory: {}", path.display());
                Removal::RemovedDirectory
            }
            Err(e) => report_failure(path, e),
        }
    } else {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Successfully removed file: {}", path.display());
                Removal::RemovedFile
            }
            Err(e) => report_failure(path, e),
        }
    }
}

/// Removes a single regular file. Directories are never touched.
fn remove_scratch_file(path: &Path) -> Removal {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            warn!("Refusing to remove directory as scratch file: {}", path.display());
            Removal::Failed {
                reason: "not a regular file".to_string(),
            }
        }
        _ => safe_remove(path),
    }
}

fn report_failure(path: &Path, e: io::Error) -> Removal {
    if e.kind() == io::ErrorKind::PermissionDenied {
        warn!("Failed to remove {}: {}", path.display(), e);
    } else {
        warn!(
            "An unexpected error occurred while removing {}: {}",
            path.display(),
            e
        );
    }
    Removal::Failed {
        reason: e.to_string(),
    }
}

/// A local scratch file that is removed when the guard goes out of scope.
///
/// The pipeline holds one per downloaded or converted artifact so cleanup runs
/// on success and on every failure path alike. Only a regular file is ever
/// deleted; a directory at the path is left alone.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    released: bool,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the file now and reports the outcome.
    pub fn release(mut self) -> Removal {
        self.released = true;
        remove_scratch_file(&self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.released {
            remove_scratch_file(&self.path);
        }
    }
}
