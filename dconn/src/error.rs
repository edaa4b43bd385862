//! Error types for direct connection management.
//!
//! Two disjoint failure classes:
//! - Invariant violations (logic defects) go through [`invariant_violation`]
//!   and never return.
//! - Environmental and handshake failures are returned as typed errors.
//!   A transport connect failure is the one case that cannot be handled
//!   locally: it is surfaced as [`ConnectError::JobMustTerminate`] and the
//!   caller executes the contained [`JobAbort`].

use crate::state::ConnState;
use dconn_common::termination::{JobTerminator, TerminateError};
use dconn_common::topology::{JobStepId, NodeId};
use dconn_common::transport::{ProgressType, TransportError};
use nix::sys::signal::Signal;
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Emit a diagnostic and abort on a broken internal invariant.
///
/// Release builds use `panic = "abort"`, so the process terminates here.
#[track_caller]
pub(crate) fn invariant_violation(msg: fmt::Arguments<'_>) -> ! {
    error!("{msg}");
    panic!("{msg}");
}

/// Manager initialization errors. No partial state is retained.
#[derive(Debug, Error)]
pub enum InitError {
    /// No backend registered under the requested name.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// Backend could not supply a polling descriptor.
    #[error("Cannot get polling fd from backend '{backend}': {source}")]
    PollUnavailable {
        /// Backend name
        backend: &'static str,
        /// Underlying backend error
        source: TransportError,
    },

    /// Local node id does not fit the registry.
    #[error("Local node {node_id} out of range for {peer_count} peers")]
    LocalNodeOutOfRange {
        /// Local node id
        node_id: NodeId,
        /// Requested registry size
        peer_count: u32,
    },
}

/// Everything needed to terminate the job step after a failed connect.
#[derive(Debug)]
pub struct JobAbort {
    /// Step to terminate.
    pub step: JobStepId,
    /// Peer that could not be reached.
    pub node_id: NodeId,
    /// Hostname of that peer.
    pub hostname: String,
    /// Signal to deliver to every task of the step.
    pub signal: Signal,
    /// Transport failure that caused the abort.
    pub cause: TransportError,
}

impl JobAbort {
    /// Terminate the job step. Consumes the abort so it runs at most once.
    pub fn execute(self, terminator: &dyn JobTerminator) -> Result<(), TerminateError> {
        error!(
            "Aborting job step {} after direct connection failure to {} ({})",
            self.step, self.hostname, self.node_id
        );
        terminator.kill_job_step(self.step, self.signal)
    }
}

impl fmt::Display for JobAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot establish direct connection to {} ({}): {}",
            self.hostname, self.node_id, self.cause
        )
    }
}

/// Connect errors.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The job step cannot continue; execute the abort.
    #[error("{0}")]
    JobMustTerminate(Box<JobAbort>),
}

impl ConnectError {
    /// The abort to execute.
    pub fn into_abort(self) -> JobAbort {
        match self {
            Self::JobMustTerminate(abort) => *abort,
        }
    }
}

/// Accept errors. Recoverable: the peer may retry.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// Backend progress type has no accept path.
    #[error("Accept is not supported by direct connection of type {0}")]
    Unsupported(ProgressType),

    /// Slot was not waiting for a peer-initiated connection.
    #[error("Unexpected direct connection state for node {node_id}: {state}")]
    UnexpectedState {
        /// Peer node id
        node_id: NodeId,
        /// Observed state
        state: ConnState,
    },

    /// Queued messages could not be flushed into the accepted descriptor.
    #[error("Cannot attach direct connection from node {node_id}: {source}")]
    Attach {
        /// Peer node id
        node_id: NodeId,
        /// Flush failure
        #[source]
        source: std::io::Error,
    },
}

/// Send errors.
#[derive(Debug, Error)]
#[error("Send to node {node_id} failed: {source}")]
pub struct SendError {
    /// Peer node id
    pub node_id: NodeId,
    /// Underlying backend error
    pub source: TransportError,
}
