#![allow(dead_code)]

pub use quorumctl_test_utils::builders::ExperimentConfigBuilder;
pub use quorumctl_test_utils::fakes;
pub use quorumctl_test_utils::{init_tracing, with_timeout};

use std::path::{Path, PathBuf};

/// Write an executable `sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
