//! System-wide constants for the direct connection workspace.
//!
//! Single source of truth for limits and default paths.

use nix::sys::signal::Signal;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dconn/dconn.toml";

/// Default software backend name.
pub const DEFAULT_SOFTWARE_BACKEND: &str = "tcp";

/// Default hardware backend name.
pub const DEFAULT_HARDWARE_BACKEND: &str = "ucx";

/// Default TCP listener bind address.
pub const DEFAULT_TCP_BIND_ADDR: &str = "0.0.0.0";

/// Size in bytes of the TCP endpoint blob (listener port, big-endian).
pub const TCP_ENDPOINT_LEN: usize = 2;

/// Signal delivered to every task of the job step when a direct
/// connection cannot be established.
pub const JOB_ABORT_SIGNAL: Signal = Signal::SIGKILL;

/// Upper bound on a single framed message accepted by the buffered I/O engine.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
