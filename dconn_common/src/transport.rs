//! Transport backend contract and capability types.
//!
//! This module defines:
//! - `TransportBackend` trait - process-wide half of a pluggable backend
//! - `PeerLink` trait - per-peer private state owned by a registry slot
//! - `ProgressType` / `ConnectionSemantics` - the two policy flags
//! - `BackendEndpoint` - what a backend yields when it is prepared
//! - `DirectHeader` - message header descriptor shared by every peer
//! - `TransportError` - error type for backend operations
//! - `BackendFactory` - factory function type

use crate::config::TransportConfig;
use crate::io::{IoEngine, Poller};
use crate::topology::{JobTopology, NodeId};
use std::fmt;
use std::os::fd::RawFd;
use std::sync::Arc;
use thiserror::Error;

/// Error types for transport backend operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend could not produce a polling descriptor.
    #[error("Cannot get polling fd: {0}")]
    PollUnavailable(String),

    /// Peer endpoint blob has an unexpected encoding.
    #[error("Invalid endpoint blob: {len} bytes, expected {expected}")]
    InvalidEndpoint {
        /// Received length
        len: usize,
        /// Expected length
        expected: usize,
    },

    /// Peer id is not part of the job.
    #[error("Unknown peer node {0}")]
    UnknownPeer(NodeId),

    /// Operation requires an established transport.
    #[error("Peer node {0} has no attached transport")]
    NotConnected(NodeId),

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// Backend-specific failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// How in-flight transport operations advance to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressType {
    /// Needs a software progress engine (select/poll/epoll).
    Software,
    /// Progresses autonomously in hardware.
    Hardware,
}

impl fmt::Display for ProgressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software => f.write_str("software"),
            Self::Hardware => f.write_str("hardware"),
        }
    }
}

/// Who has to take part in establishing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionSemantics {
    /// Both sides participate (connect/accept).
    TwoSided,
    /// One side establishes reachability alone.
    OneSided,
}

impl fmt::Display for ConnectionSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoSided => f.write_str("two-sided"),
            Self::OneSided => f.write_str("one-sided"),
        }
    }
}

/// Descriptor to register with the event-polling facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDescriptor {
    /// Backend progress is driven by readiness of this descriptor.
    Fd(RawFd),
    /// Backend needs no polling.
    NotRequired,
}

impl PollDescriptor {
    /// Raw descriptor, if any.
    pub fn fd(&self) -> Option<RawFd> {
        match self {
            Self::Fd(fd) => Some(*fd),
            Self::NotRequired => None,
        }
    }
}

/// Opaque address/capability data a node publishes so peers can reach it.
///
/// Encoding is owned by the backend that produced it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EndpointBlob(Vec<u8>);

impl EndpointBlob {
    /// Wrap raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Blob contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Blob length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex rendering for logs and out-of-band publication.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse the output of [`EndpointBlob::to_hex`]. `None` on malformed input.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() % 2 != 0 {
            return None;
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
            .collect::<Option<Vec<u8>>>()
            .map(Self)
    }
}

impl fmt::Debug for EndpointBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointBlob({})", self.to_hex())
    }
}

/// Result of preparing a backend at startup.
#[derive(Debug, Clone)]
pub struct BackendEndpoint {
    /// Descriptor for the polling facility.
    pub poll: PollDescriptor,
    /// Endpoint to publish to peers.
    pub blob: EndpointBlob,
}

/// Message header descriptor shared by all peers of a backend.
///
/// Every message on the wire starts with a fixed-size header of
/// `net_size` bytes; `payload_len` extracts the length of the body that
/// follows from that header, or `None` if the header is malformed.
#[derive(Debug, Clone, Copy)]
pub struct DirectHeader {
    /// Size of the network header in bytes.
    pub net_size: usize,
    /// Extra bytes reserved in front of every received message.
    pub recv_padding: usize,
    /// Body length encoded in a header.
    pub payload_len: fn(&[u8]) -> Option<usize>,
}

impl DirectHeader {
    /// Header made of a single big-endian `u32` body length.
    pub fn length_prefixed() -> Self {
        Self {
            net_size: 4,
            recv_padding: 0,
            payload_len: |hdr| {
                let bytes: [u8; 4] = hdr.get(..4)?.try_into().ok()?;
                Some(u32::from_be_bytes(bytes) as usize)
            },
        }
    }

    /// Frame `body` with a length-prefixed header.
    pub fn frame(body: &[u8]) -> Vec<u8> {
        let mut msg = Vec::with_capacity(4 + body.len());
        msg.extend_from_slice(&(body.len() as u32).to_be_bytes());
        msg.extend_from_slice(body);
        msg
    }
}

/// Per-peer private state created by [`TransportBackend::init_peer`].
///
/// Owned exclusively by one registry slot and only touched while that
/// slot's lock is held.
pub trait PeerLink: Send {
    /// Establish the transport to the peer described by `endpoint` and
    /// queue `init_msg` as the first message, if any.
    fn connect(&mut self, endpoint: &[u8], init_msg: Option<&[u8]>) -> Result<(), TransportError>;

    /// Send one message to the peer.
    fn send(&mut self, msg: &[u8]) -> Result<(), TransportError>;

    /// Buffered I/O handle of the peer. `None` for hardware-progress links.
    fn io_engine(&mut self) -> Option<&mut dyn IoEngine>;

    /// Release per-peer resources. Called once at manager teardown.
    fn fini(&mut self) {}
}

/// Trait defining the interface for direct connection backends.
///
/// The connection manager drives exactly one backend for the whole process
/// lifetime through this trait; it never inspects which backend it holds.
///
/// # Lifecycle
///
/// 1. `prepare()` - once at startup, yields poll descriptor and endpoint
/// 2. `init_peer()` - once per registry slot
/// 3. `register_with_poller()` - when the caller sets up its event loop
/// 4. `stop()` - before per-peer teardown
/// 5. `PeerLink::fini()` - per slot
/// 6. `finalize()` - global teardown
pub trait TransportBackend: Send + Sync {
    /// Backend identifier (e.g. "tcp", "ucx").
    fn name(&self) -> &'static str;

    /// Progress model of this backend.
    fn progress_type(&self) -> ProgressType;

    /// Connection semantics of this backend.
    fn connection_semantics(&self) -> ConnectionSemantics;

    /// Bring the backend up and produce the endpoint to publish.
    ///
    /// # Errors
    /// Returns `TransportError::PollUnavailable` (or the underlying I/O
    /// error) if the backend cannot supply a polling descriptor.
    fn prepare(&mut self) -> Result<BackendEndpoint, TransportError>;

    /// Create the private state of peer `node_id`.
    fn init_peer(&self, node_id: NodeId, header: &DirectHeader) -> Box<dyn PeerLink>;

    /// Hook the backend's descriptor(s) into the event-polling facility.
    /// Default: no-op (hardware progress).
    fn register_with_poller(&self, _poller: &mut dyn Poller) -> Result<(), TransportError> {
        Ok(())
    }

    /// Quiesce backend progress before peers are torn down.
    fn stop(&mut self) {}

    /// Release global backend resources after peers are torn down.
    fn finalize(&mut self) {}
}

/// Factory function type for creating backend instances.
pub type BackendFactory =
    fn(&TransportConfig, Arc<dyn JobTopology>) -> Box<dyn TransportBackend>;
