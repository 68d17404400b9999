// src/prep/logspace.rs

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{QuorumError, Result};
use crate::fs::{FileSystem, RealFileSystem};

/// Per-run log directory housekeeping.
#[derive(Debug, Clone)]
pub struct LogSpace {
    fs: Arc<dyn FileSystem>,
}

impl Default for LogSpace {
    fn default() -> Self {
        Self::new(Arc::new(RealFileSystem))
    }
}

impl LogSpace {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Delete every file in `known_files` that exists under `log_dir`, then
    /// (re)create `log_dir`.
    ///
    /// A missing `log_dir` is the first-run case and counts as success.
    /// Returns how many files were removed. Any error other than "not found"
    /// is returned as [`QuorumError::Precondition`].
    pub fn reset(&self, log_dir: &Path, known_files: &[String]) -> Result<usize> {
        let mut cleared = 0;

        if self.fs.is_dir(log_dir) {
            for name in known_files {
                let path = log_dir.join(name);
                match self.fs.remove_file(&path) {
                    Ok(()) => {
                        debug!(file = %path.display(), "deleted log file");
                        cleared += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(QuorumError::Precondition(format!(
                            "could not delete log file {}: {e}",
                            path.display()
                        )));
                    }
                }
            }
        } else {
            info!(log_dir = %log_dir.display(), "no log directory yet; nothing to clear");
        }

        self.fs.create_dir_all(log_dir).map_err(|e| {
            QuorumError::Precondition(format!(
                "could not create log directory {}: {e}",
                log_dir.display()
            ))
        })?;

        info!(log_dir = %log_dir.display(), cleared, "log space ready");
        Ok(cleared)
    }
}
