//! Job step termination primitive.
//!
//! A direct connection that cannot be established makes the step's
//! collective operations impossible to complete, so the whole step is
//! killed. The connection manager only reports that condition; the
//! orchestration layer performs the kill through a [`JobTerminator`].

use crate::topology::JobStepId;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, getpgrp};
use thiserror::Error;
use tracing::error;

/// Error type for job termination.
#[derive(Debug, Error)]
pub enum TerminateError {
    /// Signal delivery failed.
    #[error("failed to signal job step {step}: {source}")]
    Signal {
        /// Step that was being terminated.
        step: JobStepId,
        /// Source nix error
        source: nix::Error,
    },
}

/// Forcibly terminates all tasks of a running job step.
pub trait JobTerminator: Send + Sync {
    /// Deliver `signal` to every task of `step`.
    fn kill_job_step(&self, step: JobStepId, signal: Signal) -> Result<(), TerminateError>;
}

/// Terminates the step by signalling the local step's process group.
///
/// Suitable when every task of the step on this node shares one process
/// group; remote nodes observe the loss of their direct connections.
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroupTerminator {
    pgid: Pid,
}

impl ProcessGroupTerminator {
    /// Terminator targeting process group `pgid`.
    pub fn new(pgid: Pid) -> Self {
        Self { pgid }
    }

    /// Terminator targeting the calling process's group.
    pub fn current() -> Self {
        Self::new(getpgrp())
    }

    /// Targeted process group.
    pub fn pgid(&self) -> Pid {
        self.pgid
    }
}

impl JobTerminator for ProcessGroupTerminator {
    fn kill_job_step(&self, step: JobStepId, signal: Signal) -> Result<(), TerminateError> {
        error!(
            "Terminating job step {} (process group {}) with {:?}",
            step, self.pgid, signal
        );
        killpg(self.pgid, signal).map_err(|source| TerminateError::Signal { step, source })
    }
}
