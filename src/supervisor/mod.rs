// src/supervisor/mod.rs

//! ExperimentSupervisor.
//!
//! Split the same way as a pure core and an IO shell:
//! - `state`: the lifecycle state machine, no IO;
//! - `runtime`: the async driver that runs each phase against the
//!   collaborators and advances the state machine;
//! - `shutdown`: the terminate / wait / kill barrier;
//! - `interrupt`: the shutdown request channel fed by signal handlers.

pub mod interrupt;
pub mod runtime;
pub mod shutdown;
pub mod state;

pub use interrupt::{Interrupt, InterruptHandle, interrupt_channel};
pub use runtime::{Collaborators, RunReport, Supervisor};
pub use shutdown::{ShutdownOutcome, shutdown_barrier};
pub use state::{InvalidTransition, StateMachine, SupervisorState};
