// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `quorumctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "quorumctl",
    version,
    about = "Provision, launch, supervise and tear down a local or remote consensus cluster.",
    long_about = None
)]
pub struct CliArgs {
    /// Number of consensus nodes to start (1-10).
    #[arg(
        value_name = "NODE_COUNT",
        default_value_t = 4,
        value_parser = clap::value_parser!(u32).range(1..=10)
    )]
    pub node_count: u32,

    /// Run every worker detached with captured output (no terminal windows).
    #[arg(long, conflicts_with = "remote")]
    pub headless: bool,

    /// Launch nodes on the hosts listed in the `[remote]` config section.
    #[arg(long)]
    pub remote: bool,

    /// Path to an optional TOML config file.
    ///
    /// Default: `Quorum.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `QUORUMCTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Skip the dependency-resolution and compile stages.
    #[arg(long)]
    pub skip_build: bool,

    /// Shut the whole cluster down when any worker fails after launch.
    #[arg(long)]
    pub abort_on_worker_exit: bool,

    /// Resolve the config and print the launch plan, but don't touch anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
