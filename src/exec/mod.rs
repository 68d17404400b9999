// src/exec/mod.rs

//! Subprocess plumbing shared by the preparation steps and the launchers.
//!
//! - [`timed`] runs a short-lived command to completion under a time bound
//!   (build stages, port inspection, toolchain probe).
//! - [`output`] drains a long-lived child's stdout/stderr into a bounded
//!   in-memory tail so that an exit can be reported with its last lines.
//! - [`signal`] sends termination signals to bare pids.

pub mod output;
pub mod signal;
pub mod timed;

pub use output::OutputTail;
pub use timed::{CommandOutcome, ExecFailure, run_with_timeout};
