use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

/// Boxed future returned by the collaborator traits, so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which kind of worker a process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Node,
    Client,
}

impl Role {
    /// Role selector as understood by the worker binary (`-r <role>`).
    pub fn as_arg(&self) -> &'static str {
        match self {
            Role::Node => "node",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Where the cluster runs.
///
/// - `Local`: every worker on this machine, interactive terminals if possible.
/// - `Headless`: every worker on this machine, detached with captured output.
/// - `Remote`: nodes on the hosts listed in `[remote].hosts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Headless,
    Remote,
}

impl Mode {
    /// Execution mode selector passed to the worker (`-m <mode>`).
    ///
    /// The worker only distinguishes local and remote networking; headless is
    /// a presentation concern of the supervisor.
    pub fn worker_arg(&self) -> &'static str {
        match self {
            Mode::Local | Mode::Headless => "local",
            Mode::Remote => "remote",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => f.write_str("local"),
            Mode::Headless => f.write_str("headless"),
            Mode::Remote => f.write_str("remote"),
        }
    }
}

/// How a launched worker is presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Inside a terminal emulator window; the handle tracks the terminal.
    Foreground,
    /// Detached with captured output; the handle tracks the worker itself.
    Headless,
    /// Through an `ssh` session; the handle tracks the session.
    Remote,
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presentation::Foreground => f.write_str("foreground"),
            Presentation::Headless => f.write_str("headless"),
            Presentation::Remote => f.write_str("remote"),
        }
    }
}

/// Policy for a worker that ends on its own after the cluster is running.
///
/// - `Tolerate` (default): report the exit and keep supervising the rest.
/// - `Abort`: a failed exit (non-zero code or killed) shuts the whole
///   cluster down and the run ends with a non-zero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerExitPolicy {
    #[default]
    Tolerate,
    Abort,
}

/// Network endpoint a worker listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
