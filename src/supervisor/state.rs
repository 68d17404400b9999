// src/supervisor/state.rs

//! Pure supervisor state machine.
//!
//! No IO, no Tokio: it only records which phase a run is in and refuses
//! transitions the run lifecycle does not allow.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    Idle,
    Cleaning,
    Building,
    Launching,
    Running,
    ShuttingDown,
    Terminated,
    Failed,
}

impl SupervisorState {
    /// `Terminated` and `Failed` are absorbing.
    pub fn is_final(&self) -> bool {
        matches!(self, SupervisorState::Terminated | SupervisorState::Failed)
    }

    pub fn can_advance_to(&self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Idle, Cleaning)
                | (Cleaning, Building)
                | (Building, Launching)
                | (Launching, Running)
                | (Running, ShuttingDown)
                | (ShuttingDown, Terminated)
                | (Cleaning | Building | Launching, Failed)
                // An interrupt may arrive in any non-final state.
                | (Idle | Cleaning | Building | Launching, ShuttingDown)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Cleaning => "cleaning",
            SupervisorState::Building => "building",
            SupervisorState::Launching => "launching",
            SupervisorState::Running => "running",
            SupervisorState::ShuttingDown => "shutting-down",
            SupervisorState::Terminated => "terminated",
            SupervisorState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid supervisor transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SupervisorState,
    pub to: SupervisorState,
}

/// Current state plus every state visited so far, starting at `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    current: SupervisorState,
    history: Vec<SupervisorState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: SupervisorState::Idle,
            history: vec![SupervisorState::Idle],
        }
    }

    pub fn current(&self) -> SupervisorState {
        self.current
    }

    pub fn history(&self) -> &[SupervisorState] {
        &self.history
    }

    pub fn advance(&mut self, next: SupervisorState) -> Result<(), InvalidTransition> {
        if !self.current.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}
