// src/prep/build.rs

//! ArtifactBuilder: produce the worker executable.
//!
//! Two ordered stages, dependency resolution then compilation, each under
//! its own time bound. The toolchain decides whether anything actually needs
//! recompiling, so running the build on an up-to-date tree is fine.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};

use crate::config::ExperimentConfig;
use crate::errors::{BuildError, BuildStage};
use crate::exec::{ExecFailure, run_with_timeout};
use crate::types::BoxFuture;

pub trait ArtifactBuilder: Send + Sync {
    fn build(&self) -> BoxFuture<'_, Result<(), BuildError>>;
}

/// One build stage: a command line and its time bound.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub stage: BuildStage,
    pub argv: Vec<String>,
    pub timeout: Duration,
}

/// Runs the configured stages as subprocesses in the working directory.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    working_dir: PathBuf,
    steps: Vec<BuildStep>,
}

impl CommandBuilder {
    pub fn new(working_dir: PathBuf, steps: Vec<BuildStep>) -> Self {
        Self { working_dir, steps }
    }

    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        Self::new(
            cfg.working_dir.clone(),
            vec![
                BuildStep {
                    stage: BuildStage::DependencyResolution,
                    argv: cfg.build.resolve.clone(),
                    timeout: cfg.build.resolve_timeout,
                },
                BuildStep {
                    stage: BuildStage::Compilation,
                    argv: cfg.build.compile.clone(),
                    timeout: cfg.build.compile_timeout,
                },
            ],
        )
    }

    async fn run_step(&self, step: &BuildStep) -> Result<(), BuildError> {
        info!(stage = %step.stage, cmd = ?step.argv, "running build stage");

        match run_with_timeout(&step.argv, Some(&self.working_dir), step.timeout).await {
            Ok(out) if out.success() => {
                info!(stage = %step.stage, "build stage succeeded");
                Ok(())
            }
            Ok(out) => {
                let stderr = if out.stderr.trim().is_empty() {
                    format!("{} exited with code {:?}", step.argv.join(" "), out.code)
                } else {
                    out.stderr
                };
                error!(stage = %step.stage, code = ?out.code, "build stage failed");
                Err(BuildError {
                    stage: step.stage,
                    stderr,
                })
            }
            Err(ExecFailure::TimedOut { after, .. }) => {
                error!(stage = %step.stage, ?after, "build stage timed out");
                Err(BuildError {
                    stage: BuildStage::Timeout,
                    stderr: format!("{} stage did not finish within {after:?}", step.stage),
                })
            }
            Err(e) => {
                error!(stage = %step.stage, error = %e, "build stage could not run");
                Err(BuildError {
                    stage: step.stage,
                    stderr: e.to_string(),
                })
            }
        }
    }
}

impl ArtifactBuilder for CommandBuilder {
    fn build(&self) -> BoxFuture<'_, Result<(), BuildError>> {
        Box::pin(async move {
            // A failing stage aborts the remaining ones.
            for step in &self.steps {
                self.run_step(step).await?;
            }
            Ok(())
        })
    }
}
