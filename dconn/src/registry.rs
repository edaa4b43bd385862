//! Fixed-size table of per-peer connection slots.
//!
//! One slot per node id, built once at initialization and never resized.
//! Each slot carries its own lock; the table itself needs no synchronization
//! because its layout is immutable after construction.

use crate::error::invariant_violation;
use crate::state::ConnState;
use dconn_common::topology::NodeId;
use dconn_common::transport::{DirectHeader, PeerLink, TransportBackend};
use parking_lot::{Mutex, MutexGuard};

/// Lock-protected contents of a slot.
pub(crate) struct PeerEntry {
    pub(crate) state: ConnState,
    pub(crate) link: Box<dyn PeerLink>,
}

/// One peer's slot: immutable id plus lock-protected state and private handle.
pub(crate) struct PeerSlot {
    node_id: NodeId,
    entry: Mutex<PeerEntry>,
}

/// Registry of all peer slots, indexed by node id.
pub(crate) struct ConnectionRegistry {
    slots: Box<[PeerSlot]>,
}

impl ConnectionRegistry {
    /// Build `peer_count` slots in `Init`, each with backend private state.
    pub(crate) fn new(
        peer_count: u32,
        backend: &dyn TransportBackend,
        header: &DirectHeader,
    ) -> Self {
        let slots = (0..peer_count)
            .map(|node_id| PeerSlot {
                node_id,
                entry: Mutex::new(PeerEntry {
                    state: ConnState::Init,
                    link: backend.init_peer(node_id, header),
                }),
            })
            .collect();
        Self { slots }
    }

    /// Number of slots.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Block until the slot of `node_id` is locked.
    ///
    /// # Panics
    /// `node_id` outside the registry, or a slot whose stored id does not
    /// match its position.
    pub(crate) fn lock(&self, node_id: NodeId) -> MutexGuard<'_, PeerEntry> {
        let Some(slot) = self.slots.get(node_id as usize) else {
            invariant_violation(format_args!(
                "Node id {} out of range for {} direct connections",
                node_id,
                self.slots.len()
            ));
        };
        if slot.node_id != node_id {
            invariant_violation(format_args!(
                "Direct connection slot {} holds node id {}",
                node_id, slot.node_id
            ));
        }
        slot.entry.lock()
    }

    /// Tear down every slot's private state. Locks are taken uncontended.
    pub(crate) fn fini_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.entry.get_mut().link.fini();
        }
    }
}
