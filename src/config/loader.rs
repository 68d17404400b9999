// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ExperimentConfig, Overrides, RawExperimentFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawExperimentFile`.
///
/// This only performs TOML deserialization; semantic validation happens when
/// the raw file is combined with the CLI [`Overrides`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawExperimentFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawExperimentFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load (or default) the file, apply CLI overrides and validate.
///
/// - `Some(path)`: the file must exist.
/// - `None`: [`default_config_path`] is used when it exists, otherwise all
///   defaults apply.
///
/// `working_dir` is made absolute against the current directory so that
/// terminal emulators (which may start elsewhere) `cd` to the right place.
pub fn load_experiment(path: Option<&Path>, overrides: Overrides) -> Result<ExperimentConfig> {
    let raw = match path {
        Some(p) => load_from_path(p)?,
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_from_path(&default)?
            } else {
                RawExperimentFile::default()
            }
        }
    };

    let mut config = ExperimentConfig::try_from((raw, overrides))?;
    config.working_dir = std::path::absolute(&config.working_dir)?;
    Ok(config)
}

/// Config file picked up when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Quorum.toml")
}
