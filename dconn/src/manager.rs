//! Direct connection manager facade.
//!
//! `DirectConnManager` is the single process-wide context of the direct
//! connection layer. It owns the active backend, the values the backend
//! published at startup, and the peer registry. Construction is
//! [`DirectConnManager::initialize`]; teardown is
//! [`DirectConnManager::finalize`], which consumes the manager.

use crate::error::{AcceptError, InitError};
use crate::peer::PeerGuard;
use crate::registry::ConnectionRegistry;
use dconn_common::io::Poller;
use dconn_common::topology::{JobTopology, NodeId};
use dconn_common::transport::{
    ConnectionSemantics, DirectHeader, EndpointBlob, PollDescriptor, ProgressType,
    TransportBackend, TransportError,
};
use static_assertions::assert_impl_all;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use tracing::{error, info};

/// Process-wide direct connection manager.
pub struct DirectConnManager {
    /// Active backend, fixed for the process lifetime
    backend: Box<dyn TransportBackend>,
    /// Progress model of the active backend
    progress: ProgressType,
    /// Connection semantics of the active backend
    semantics: ConnectionSemantics,
    /// Descriptor for the polling facility
    poll: PollDescriptor,
    /// Endpoint published to peers
    endpoint: EndpointBlob,
    /// One slot per peer node id
    registry: ConnectionRegistry,
    /// Job topology (local id, hostnames, step ids)
    topology: Arc<dyn JobTopology>,
}

assert_impl_all!(DirectConnManager: Send, Sync);

impl DirectConnManager {
    /// Prepare `backend`, then build `peer_count` slots in `Init`.
    ///
    /// # Arguments
    /// * `backend` - Selected backend (see `BackendRegistry::select`)
    /// * `topology` - Job topology
    /// * `peer_count` - Number of nodes in the step
    /// * `header` - Message header descriptor passed to every peer
    ///
    /// # Errors
    /// Returns `InitError::PollUnavailable` if the backend cannot supply a
    /// polling descriptor, `InitError::LocalNodeOutOfRange` if the local node
    /// has no slot. The backend is dropped on error.
    pub fn initialize(
        mut backend: Box<dyn TransportBackend>,
        topology: Arc<dyn JobTopology>,
        peer_count: u32,
        header: &DirectHeader,
    ) -> Result<Self, InitError> {
        let node_id = topology.node_id();
        if node_id >= peer_count {
            return Err(InitError::LocalNodeOutOfRange {
                node_id,
                peer_count,
            });
        }

        let prepared = backend.prepare().map_err(|source| {
            error!("Cannot get polling fd from backend '{}'", backend.name());
            InitError::PollUnavailable {
                backend: backend.name(),
                source,
            }
        })?;

        let progress = backend.progress_type();
        let semantics = backend.connection_semantics();
        let registry = ConnectionRegistry::new(peer_count, backend.as_ref(), header);

        info!(
            "Direct connections initialized: backend={}, progress={}, semantics={}, peers={}, endpoint={} bytes",
            backend.name(),
            progress,
            semantics,
            peer_count,
            prepared.blob.len()
        );

        Ok(Self {
            backend,
            progress,
            semantics,
            poll: prepared.poll,
            endpoint: prepared.blob,
            registry,
            topology,
        })
    }

    /// Stop the backend, tear down every peer, then finalize the backend.
    pub fn finalize(mut self) {
        info!("Finalizing {} direct connections", self.registry.len());
        self.backend.stop();
        self.registry.fini_all();
        self.backend.finalize();
    }

    /// Block until the slot of `node_id` is locked.
    ///
    /// # Panics
    /// If `node_id` is not below the peer count.
    pub fn lock(&self, node_id: NodeId) -> PeerGuard<'_> {
        let entry = self.registry.lock(node_id);
        PeerGuard::new(self, node_id, entry)
    }

    /// Complete a peer-initiated connection on `fd`.
    ///
    /// Returns the locked slot on success. Recoverable failures (hardware
    /// progress, slot not in `EpSent`, flush error) leave the slot unlocked
    /// and close `fd`.
    pub fn accept(&self, node_id: NodeId, fd: OwnedFd) -> Result<PeerGuard<'_>, AcceptError> {
        if self.progress != ProgressType::Software {
            error!(
                "Accept is not supported by direct connection of type {}",
                self.progress
            );
            return Err(AcceptError::Unsupported(self.progress));
        }

        let mut guard = self.lock(node_id);
        guard.complete_accept(fd)?;
        Ok(guard)
    }

    /// Hook the backend's descriptor(s) into `poller`.
    pub fn register_with_poller(&self, poller: &mut dyn Poller) -> Result<(), TransportError> {
        self.backend.register_with_poller(poller)
    }

    /// Progress model of the active backend.
    #[inline]
    pub fn progress_type(&self) -> ProgressType {
        self.progress
    }

    /// Connection semantics of the active backend.
    #[inline]
    pub fn connection_semantics(&self) -> ConnectionSemantics {
        self.semantics
    }

    /// Descriptor to register with the polling facility.
    #[inline]
    pub fn poll_descriptor(&self) -> PollDescriptor {
        self.poll
    }

    /// Endpoint blob to publish to peers.
    #[inline]
    pub fn endpoint_blob(&self) -> &EndpointBlob {
        &self.endpoint
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Number of peer slots.
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Id of the local node.
    pub fn local_node_id(&self) -> NodeId {
        self.topology.node_id()
    }

    /// Job topology.
    pub fn topology(&self) -> &dyn JobTopology {
        self.topology.as_ref()
    }
}
