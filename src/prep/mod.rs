// src/prep/mod.rs

//! Environment preparation performed before any worker starts.
//!
//! - [`ports`]: reclaim the cluster's TCP ports (best effort).
//! - [`logspace`]: clear and recreate the per-run log directory.
//! - [`build`]: build the worker executable in two timed stages.
//! - [`collab`]: toolchain and dataset presence checks.

pub mod build;
pub mod collab;
pub mod logspace;
pub mod ports;

pub use build::{ArtifactBuilder, BuildStep, CommandBuilder};
pub use collab::{CommandProbe, DatasetProvider, FileDataset, ToolchainProbe};
pub use logspace::LogSpace;
pub use ports::{PortClaim, PortReclaimer, PortReservation};
