//! Buffered I/O engine and event-polling contracts.
//!
//! - `engine`: [`IoEngine`] trait and the socket-backed [`BufferedIo`].
//! - `poller`: [`Poller`] registration contract.

pub mod engine;
pub mod poller;

pub use engine::{BufferedIo, IoEngine};
pub use poller::{PollInterest, Poller};
