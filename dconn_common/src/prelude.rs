//! Prelude module for common re-exports.
//!
//! ```rust
//! use dconn_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, DconnConfig, JobConfig, LogLevel, SharedConfig, TransportConfig,
};

// ─── Topology ───────────────────────────────────────────────────────
pub use crate::topology::{JobStepId, JobTopology, NodeId, StaticTopology};

// ─── Transport ──────────────────────────────────────────────────────
pub use crate::transport::{
    BackendEndpoint, BackendFactory, ConnectionSemantics, DirectHeader, EndpointBlob, PeerLink,
    PollDescriptor, ProgressType, TransportBackend, TransportError,
};

// ─── I/O ────────────────────────────────────────────────────────────
pub use crate::io::{BufferedIo, IoEngine, PollInterest, Poller};

// ─── Termination ────────────────────────────────────────────────────
pub use crate::consts::JOB_ABORT_SIGNAL;
pub use crate::termination::{JobTerminator, ProcessGroupTerminator, TerminateError};
