// src/prep/collab.rs

//! Narrow interfaces to the collaborators around the supervisor: the
//! toolchain presence check and the dataset presence check. Installing a
//! toolchain or downloading the dataset is not done here.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::{QuorumError, Result};
use crate::exec::run_with_timeout;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::BoxFuture;

pub trait ToolchainProbe: Send + Sync {
    fn is_toolchain_available(&self) -> BoxFuture<'_, bool>;
}

/// Toolchain is "available" when the probe command exits 0 in time.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

impl ToolchainProbe for CommandProbe {
    fn is_toolchain_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match run_with_timeout(&self.argv, None, self.timeout).await {
                Ok(out) if out.success() => {
                    info!(version = %out.stdout.trim(), "toolchain found");
                    true
                }
                Ok(out) => {
                    debug!(code = ?out.code, stderr = %out.stderr.trim(), "toolchain probe failed");
                    false
                }
                Err(e) => {
                    debug!(error = %e, "toolchain probe could not run");
                    false
                }
            }
        })
    }
}

pub trait DatasetProvider: Send + Sync {
    /// Ok when the dataset at `path` is usable; otherwise the error says why
    /// and how to fix it.
    fn ensure_dataset_present(&self, path: &Path) -> Result<()>;
}

/// Accepts any non-empty file already on disk.
#[derive(Debug, Clone)]
pub struct FileDataset {
    fs: Arc<dyn FileSystem>,
    source_url: Option<String>,
}

impl FileDataset {
    pub fn new(fs: Arc<dyn FileSystem>, source_url: Option<String>) -> Self {
        Self { fs, source_url }
    }

    pub fn on_disk(source_url: Option<String>) -> Self {
        Self::new(Arc::new(RealFileSystem), source_url)
    }

    fn missing(&self, path: &Path, what: &str) -> QuorumError {
        let hint = match &self.source_url {
            Some(url) => format!("; download it from {url} and place it at {}", path.display()),
            None => String::new(),
        };
        QuorumError::Dataset(format!("{} {what}{hint}", path.display()))
    }
}

impl DatasetProvider for FileDataset {
    fn ensure_dataset_present(&self, path: &Path) -> Result<()> {
        if !self.fs.is_file(path) {
            return Err(self.missing(path, "does not exist"));
        }
        match self.fs.file_len(path) {
            Ok(0) => Err(self.missing(path, "is empty")),
            Ok(len) => {
                info!(path = %path.display(), bytes = len, "dataset present");
                Ok(())
            }
            Err(e) => Err(QuorumError::Dataset(format!(
                "could not read {}: {e}",
                path.display()
            ))),
        }
    }
}
