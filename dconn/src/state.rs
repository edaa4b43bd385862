//! Per-peer connection state machine and handshake policy.
//!
//! Lifecycle of one direct connection: `Init → EpSent → Connected`, with
//! disconnect resetting back to `Init`. There is no failure state: a
//! transition that is not in the table is a logic defect and aborts.
//!
//! The handshake policy decides, per peer, whether this side has to drive
//! the transport-level connect and whether it must advertise its own
//! endpoint first. For two-sided transports the higher node id initiates,
//! so exactly one side calls connect when both race.

use crate::error::invariant_violation;
use dconn_common::topology::NodeId;
use dconn_common::transport::ConnectionSemantics;
use std::fmt;
use tracing::debug;

/// State of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnState {
    /// No handshake attempted, or connection reset.
    #[default]
    Init,
    /// Local endpoint advertised to the peer, waiting for completion.
    EpSent,
    /// Transport usable for sending.
    Connected,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("INIT"),
            Self::EpSent => f.write_str("EP_SENT"),
            Self::Connected => f.write_str("CONNECTED"),
        }
    }
}

impl ConnState {
    /// `Init → EpSent` after the local endpoint was sent to the peer.
    ///
    /// # Panics
    /// Any other pre-state means the endpoint advertisement was sent twice.
    pub fn mark_request_sent(&mut self) {
        if *self != Self::Init {
            invariant_violation(format_args!(
                "State machine violation, when transition to EP_SENT from {self}"
            ));
        }
        *self = Self::EpSent;
    }
}

/// Outcome of [`requires_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeDecision {
    /// This side must call the transport-level connect.
    pub should_connect: bool,
    /// This side must send its endpoint advertisement along with the connect.
    pub should_send_init: bool,
}

impl HandshakeDecision {
    const SKIP: Self = Self {
        should_connect: false,
        should_send_init: false,
    };
}

/// Decide whether `local` has to connect to `peer` given the slot's state.
///
/// | state       | two-sided                         | one-sided       |
/// |-------------|-----------------------------------|-----------------|
/// | `Init`      | connect + send init               | connect + send init |
/// | `EpSent`    | connect + send init iff local > peer | connect only |
/// | `Connected` | skip                              | skip            |
pub fn requires_connect(
    state: ConnState,
    semantics: ConnectionSemantics,
    local: NodeId,
    peer: NodeId,
) -> HandshakeDecision {
    match state {
        ConnState::Init => HandshakeDecision {
            should_connect: true,
            should_send_init: true,
        },
        ConnState::EpSent => match semantics {
            ConnectionSemantics::TwoSided if peer < local => HandshakeDecision {
                should_connect: true,
                should_send_init: true,
            },
            // Remote side comes with the counter-connection.
            ConnectionSemantics::TwoSided => HandshakeDecision::SKIP,
            ConnectionSemantics::OneSided => HandshakeDecision {
                should_connect: true,
                should_send_init: false,
            },
        },
        ConnState::Connected => {
            debug!("Trying to re-establish the connection to node {peer}");
            HandshakeDecision::SKIP
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
