// src/errors.rs

//! Crate-wide error types.

use std::fmt;

use thiserror::Error;

use crate::types::Role;

/// Which ArtifactBuilder stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    DependencyResolution,
    Compilation,
    /// A stage exceeded its time bound.
    Timeout,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::DependencyResolution => f.write_str("dependency-resolution"),
            BuildStage::Compilation => f.write_str("compile"),
            BuildStage::Timeout => f.write_str("timeout"),
        }
    }
}

/// Build failure with the captured stderr of the failing stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("build failed at stage {stage}: {stderr}")]
pub struct BuildError {
    pub stage: BuildStage,
    pub stderr: String,
}

/// A worker process (or remote session) could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to launch {role}{}: {cause}", id.map(|i| format!(" {i}")).unwrap_or_default())]
pub struct LaunchError {
    pub role: Role,
    pub id: Option<u32>,
    pub cause: String,
}

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Precondition error: {0}")]
    Precondition(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Dataset unavailable: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, QuorumError>;
