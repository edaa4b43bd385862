//! Direct Connection Common Library
//!
//! Shared contracts for the peer-to-peer direct connection layer of a
//! distributed job launch. Everything the connection manager consumes from
//! its collaborators lives here, so that backends and callers depend on one
//! small crate instead of on the manager itself.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and the `DconnConfig` tree
//! - [`consts`] - Shared constants
//! - [`topology`] - Job/step topology lookup (node ids, hostnames)
//! - [`transport`] - Transport backend contract and capability types
//! - [`io`] - Buffered I/O engine and event-polling contracts
//! - [`termination`] - Job step termination primitive
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! dconn_common = { path = "../dconn_common" }
//! ```
//!
//! ```rust
//! use dconn_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod io;
pub mod prelude;
pub mod termination;
pub mod topology;
pub mod transport;
