// src/config/mod.rs

//! Configuration loading and validation for quorumctl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the validated `ExperimentConfig`
//!   (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Combine it with CLI overrides and check the run invariants
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_experiment, load_from_path};
pub use model::{
    BuildSettings, DatasetSettings, ExperimentConfig, Overrides, RawExperimentFile,
    RemoteSettings, Timings,
};
