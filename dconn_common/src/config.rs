//! Configuration loading traits and types.
//!
//! A node's direct connection layer is configured from one TOML file with
//! three tables: `[shared]` (logging, service name), `[job]` (step identity
//! and host list) and `[transport]` (backend selection and per-backend
//! settings).
//!
//! # Usage
//!
//! ```rust,no_run
//! use dconn_common::config::{ConfigError, ConfigLoader, DconnConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = DconnConfig::load(Path::new("dconn.toml"))?;
//!     config.validate()?;
//!     println!("Node {} of {}", config.job.node_id, config.job.hosts.len());
//!     Ok(())
//! }
//! ```

use crate::consts::{DEFAULT_HARDWARE_BACKEND, DEFAULT_SOFTWARE_BACKEND, DEFAULT_TCP_BIND_ADDR};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared across all applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "dconn-node-0"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Job step identity and node layout.
///
/// `hosts[i]` is the hostname of node id `i`; the local node is
/// `hosts[node_id]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job identifier.
    pub job_id: u32,
    /// Step identifier within the job.
    #[serde(default)]
    pub step_id: u32,
    /// Position of this node in the step.
    pub node_id: u32,
    /// Hostnames of all nodes of the step, ordered by node id.
    pub hosts: Vec<String>,
}

impl JobConfig {
    /// Validate the job layout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `hosts` is empty
    /// - a hostname is empty or appears twice
    /// - `node_id` is not a valid index into `hosts`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::ValidationError(
                "job.hosts cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.hosts.len());
        for host in &self.hosts {
            if host.is_empty() {
                return Err(ConfigError::ValidationError(
                    "job.hosts contains an empty hostname".to_string(),
                ));
            }
            if !seen.insert(host.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "job.hosts contains duplicate host '{host}'"
                )));
            }
        }

        if self.node_id as usize >= self.hosts.len() {
            return Err(ConfigError::ValidationError(format!(
                "job.node_id {} out of range for {} hosts",
                self.node_id,
                self.hosts.len()
            )));
        }
        Ok(())
    }
}

/// TCP backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Address the direct connection listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Listener port, `0` for an ephemeral port.
    #[serde(default)]
    pub port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: 0,
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_TCP_BIND_ADDR.to_string()
}

fn default_software_backend() -> String {
    DEFAULT_SOFTWARE_BACKEND.to_string()
}

fn default_hardware_backend() -> String {
    DEFAULT_HARDWARE_BACKEND.to_string()
}

/// Transport backend selection.
///
/// # TOML Example
///
/// ```toml
/// [transport]
/// prefer_hardware = true
/// hardware_backend = "ucx"
/// software_backend = "tcp"
///
/// [transport.tcp]
/// bind_addr = "0.0.0.0"
/// port = 0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Use the hardware backend when one is registered under `hardware_backend`.
    #[serde(default)]
    pub prefer_hardware: bool,
    /// Name of the hardware-progress backend.
    #[serde(default = "default_hardware_backend")]
    pub hardware_backend: String,
    /// Name of the software-progress backend.
    #[serde(default = "default_software_backend")]
    pub software_backend: String,
    /// TCP backend settings.
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            prefer_hardware: false,
            hardware_backend: default_hardware_backend(),
            software_backend: default_software_backend(),
            tcp: TcpConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Validate backend names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.software_backend.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.software_backend cannot be empty".to_string(),
            ));
        }
        if self.prefer_hardware && self.hardware_backend.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.hardware_backend cannot be empty when prefer_hardware is set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration of one node's direct connection layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DconnConfig {
    /// Logging and service identity.
    pub shared: SharedConfig,
    /// Job step identity and host list.
    pub job: JobConfig,
    /// Backend selection.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl DconnConfig {
    /// Validate every table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.job.validate()?;
        self.transport.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
