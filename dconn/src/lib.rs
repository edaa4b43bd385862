//! # dconn
//!
//! Peer-to-peer direct connection manager for the nodes of a parallel job.
//!
//! Every node keeps one connection slot per peer. A slot runs a small state
//! machine (`Init → EpSent → Connected`) and owns the private per-peer state
//! of the single transport backend chosen at startup. Callers lock a slot,
//! ask the handshake policy whether to connect, drive the backend, and
//! unlock by dropping the guard.
//!
//! # Module Structure
//!
//! - [`manager`] - `DirectConnManager` facade, process-wide context
//! - [`peer`] - `PeerGuard`, per-peer operations under the slot lock
//! - [`state`] - connection state machine and handshake policy
//! - [`backend_registry`] - backend factory registration and selection
//! - [`backends`] - built-in transport backends
//! - [`error`] - error types and the job abort
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          dconn                                   │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────┐  │
//! │  │ BackendRegistry  │──►│ DirectConnManager│──►│ Registry     │  │
//! │  │ (select)         │   │ (context)        │   │ slot per node│  │
//! │  └──────────────────┘   └────────┬─────────┘   └──────┬───────┘  │
//! │                                  │                    │ lock     │
//! │                                  ▼                    ▼          │
//! │                       ┌──────────────────┐   ┌──────────────┐    │
//! │                       │ TransportBackend │   │  PeerGuard   │    │
//! │                       │ (trait object)   │   │  + PeerLink  │    │
//! │                       └──────────────────┘   └──────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

pub mod backend_registry;
pub mod backends;
pub mod error;
pub mod manager;
pub mod peer;
mod registry;
pub mod state;

// Re-export key types for convenience
pub use crate::backend_registry::BackendRegistry;
pub use crate::error::{AcceptError, ConnectError, InitError, JobAbort, SendError};
pub use crate::manager::DirectConnManager;
pub use crate::peer::PeerGuard;
pub use crate::state::{ConnState, HandshakeDecision, requires_connect};
