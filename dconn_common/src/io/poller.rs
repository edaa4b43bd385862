//! Event-polling registration contract.
//!
//! The polling facility itself belongs to the caller's event loop. Backends
//! only need to hand it their descriptors together with what readiness on
//! each descriptor means.

use std::io;
use std::os::fd::RawFd;

/// Meaning of readiness on a registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterest {
    /// Listening socket: readiness means a peer is connecting.
    Accept,
    /// Connected stream: readiness means data is available.
    Read,
    /// Backend event descriptor: readiness means progress is required.
    Progress,
}

/// Event-polling facility that backends register with.
pub trait Poller {
    /// Watch `fd` for readiness described by `interest`.
    fn register(&mut self, fd: RawFd, interest: PollInterest) -> io::Result<()>;
}
