//! Scoped handle to one locked peer slot.
//!
//! [`PeerGuard`] is what [`DirectConnManager::lock`] and
//! [`DirectConnManager::accept`] return. The slot stays locked for the
//! guard's lifetime and is released on every exit path, including unwinding.
//!
//! [`DirectConnManager::lock`]: crate::manager::DirectConnManager::lock
//! [`DirectConnManager::accept`]: crate::manager::DirectConnManager::accept

use crate::error::{AcceptError, ConnectError, JobAbort, SendError, invariant_violation};
use crate::manager::DirectConnManager;
use crate::registry::PeerEntry;
use crate::state::{self, ConnState, HandshakeDecision};
use dconn_common::consts::JOB_ABORT_SIGNAL;
use dconn_common::io::IoEngine;
use dconn_common::topology::NodeId;
use dconn_common::transport::ProgressType;
use nix::sys::socket::{setsockopt, sockopt};
use parking_lot::MutexGuard;
use std::os::fd::OwnedFd;
use tracing::{debug, error, warn};

/// Exclusive access to one peer's connection state and private handle.
pub struct PeerGuard<'a> {
    manager: &'a DirectConnManager,
    node_id: NodeId,
    entry: MutexGuard<'a, PeerEntry>,
}

impl<'a> PeerGuard<'a> {
    pub(crate) fn new(
        manager: &'a DirectConnManager,
        node_id: NodeId,
        entry: MutexGuard<'a, PeerEntry>,
    ) -> Self {
        Self {
            manager,
            node_id,
            entry,
        }
    }

    /// Peer node id of this slot.
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Current connection state.
    #[inline]
    pub fn state(&self) -> ConnState {
        self.entry.state
    }

    /// Record that the local endpoint was advertised (`Init → EpSent`).
    ///
    /// # Panics
    /// From any state other than `Init`.
    pub fn mark_request_sent(&mut self) {
        self.entry.state.mark_request_sent();
        debug!("Direct connection to node {} -> {}", self.node_id, self.entry.state);
    }

    /// Handshake decision for this peer under the process-wide semantics.
    pub fn requires_connect(&self) -> HandshakeDecision {
        state::requires_connect(
            self.entry.state,
            self.manager.connection_semantics(),
            self.manager.local_node_id(),
            self.node_id,
        )
    }

    /// Establish the transport to this peer and mark it `Connected`.
    ///
    /// # Errors
    /// A transport failure cannot be handled locally: the returned
    /// [`ConnectError::JobMustTerminate`] carries the abort to execute.
    ///
    /// # Panics
    /// If the failed peer's hostname cannot be resolved.
    pub fn connect(
        &mut self,
        endpoint: &[u8],
        init_msg: Option<&[u8]>,
    ) -> Result<(), ConnectError> {
        match self.entry.link.connect(endpoint, init_msg) {
            Ok(()) => {
                self.entry.state = ConnState::Connected;
                debug!("Direct connection to node {} established", self.node_id);
                Ok(())
            }
            Err(cause) => {
                let topology = self.manager.topology();
                let Some(hostname) = topology.job_host(self.node_id) else {
                    invariant_violation(format_args!(
                        "Bad nodeid = {} in the incoming message",
                        self.node_id
                    ));
                };
                error!(
                    "Cannot establish direct connection to {} ({}): {}",
                    hostname, self.node_id, cause
                );
                Err(ConnectError::JobMustTerminate(Box::new(JobAbort {
                    step: topology.step(),
                    node_id: self.node_id,
                    hostname,
                    signal: JOB_ABORT_SIGNAL,
                    cause,
                })))
            }
        }
    }

    /// Release the transport resource, if any, and reset to `Init`.
    pub fn disconnect(&mut self) {
        match self.entry.state {
            ConnState::Init | ConnState::EpSent => {}
            ConnState::Connected => {
                // Hardware links own no descriptor.
                let fd = self.entry.link.io_engine().and_then(|engine| engine.detach());
                drop(fd);
            }
        }
        self.entry.state = ConnState::Init;
        debug!("Direct connection to node {} reset", self.node_id);
    }

    /// Send `msg` through the backend. State is not inspected.
    pub fn send(&mut self, msg: &[u8]) -> Result<(), SendError> {
        self.entry.link.send(msg).map_err(|source| SendError {
            node_id: self.node_id,
            source,
        })
    }

    /// Buffered I/O handle of this peer. `None` under hardware progress.
    pub fn io_engine(&mut self) -> Option<&mut dyn IoEngine> {
        let progress = self.manager.progress_type();
        if progress != ProgressType::Software {
            error!("No I/O engine for direct connection of type {}", progress);
            return None;
        }
        self.entry.link.io_engine()
    }

    /// Release the slot lock.
    pub fn unlock(self) {}

    /// Finish a peer-initiated handshake on `fd` (`EpSent → Connected`).
    ///
    /// On a state mismatch or a failed flush `fd` is closed and the state is
    /// left unchanged.
    pub(crate) fn complete_accept(&mut self, fd: OwnedFd) -> Result<(), AcceptError> {
        let state = self.entry.state;
        let Some(engine) = self.entry.link.io_engine() else {
            invariant_violation(format_args!(
                "Software direct connection to node {} has no I/O engine",
                self.node_id
            ));
        };

        if state != ConnState::EpSent {
            error!(
                "Unexpected direct connection state for node {}: {}",
                self.node_id, state
            );
            return Err(AcceptError::UnexpectedState {
                node_id: self.node_id,
                state,
            });
        }

        // We requested this connection earlier; the peer is completing it.
        if let Err(e) = setsockopt(&fd, sockopt::TcpNoDelay, &true) {
            warn!("Failed to set TCP_NODELAY for node {}: {}", self.node_id, e);
        }
        if let Err(source) = engine.attach(fd) {
            error!(
                "Failed to attach direct connection from node {}: {}",
                self.node_id, source
            );
            return Err(AcceptError::Attach {
                node_id: self.node_id,
                source,
            });
        }
        self.entry.state = ConnState::Connected;
        debug!("Accepted direct connection from node {}", self.node_id);
        Ok(())
    }
}
