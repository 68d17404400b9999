// src/launch/command.rs

//! The worker invocation contract: `<binary> -r <role> -m <mode> [-n <id>] [extra..]`.

use std::path::Path;

use crate::types::{Endpoint, Mode, Role};

/// Environment variable carrying a worker's own listen endpoint.
pub const ENDPOINT_ENV_VAR: &str = "QUORUM_ENDPOINT";

/// One worker command line, before any presentation wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(
        program: impl Into<String>,
        role: Role,
        id: Option<u32>,
        mode: Mode,
        extra_args: &[String],
    ) -> Self {
        let mut args = vec![
            "-r".to_string(),
            role.as_arg().to_string(),
            "-m".to_string(),
            mode.worker_arg().to_string(),
        ];
        if let Some(id) = id {
            args.push("-n".to_string());
            args.push(id.to_string());
        }
        args.extend(extra_args.iter().cloned());
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Quoted for a POSIX shell.
    pub fn shell_words(&self) -> String {
        self.argv()
            .iter()
            .map(|w| shell_quote(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `cd <dir> && QUORUM_ENDPOINT=<endpoint> <command>`
    pub fn shell_line(&self, dir: &Path, endpoint: &Endpoint) -> String {
        format!(
            "cd {} && {ENDPOINT_ENV_VAR}={} {}",
            shell_quote(&dir.to_string_lossy()),
            shell_quote(&endpoint.to_string()),
            self.shell_words()
        )
    }
}

/// Single-quote `word` unless it is made only of characters a shell leaves
/// alone.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ','));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
