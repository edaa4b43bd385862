//! Transport backend selection.
//!
//! A `BackendRegistry` is an ordered table of backend factories built once at
//! startup. It is consulted a single time to pick the one backend the process
//! will use; there is no global registry.

use crate::backends;
use crate::error::InitError;
use dconn_common::config::TransportConfig;
use dconn_common::topology::JobTopology;
use dconn_common::transport::{BackendFactory, TransportBackend};
use std::sync::Arc;
use tracing::{info, warn};

/// Backends available to this process, in registration order.
pub struct BackendRegistry {
    entries: Vec<(&'static str, BackendFactory)>,
}

impl BackendRegistry {
    /// Registry without any backend.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry holding the backends compiled into this crate.
    pub fn with_builtin() -> Self {
        Self::empty().with_backend(backends::tcp::NAME, backends::tcp::create_backend)
    }

    /// Add a backend. A later entry under an existing name shadows it.
    #[must_use]
    pub fn with_backend(mut self, name: &'static str, factory: BackendFactory) -> Self {
        self.entries.push((name, factory));
        self
    }

    fn lookup(&self, name: &str) -> Option<BackendFactory> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| *entry == name)
            .map(|&(_, factory)| factory)
    }

    /// Instantiate the backend registered under `name`.
    ///
    /// # Errors
    /// `InitError::BackendNotFound` if nothing is registered under `name`.
    pub fn create_backend(
        &self,
        name: &str,
        config: &TransportConfig,
        topology: Arc<dyn JobTopology>,
    ) -> Result<Box<dyn TransportBackend>, InitError> {
        let factory = self
            .lookup(name)
            .ok_or_else(|| InitError::BackendNotFound(name.to_string()))?;
        Ok(factory(config, topology))
    }

    /// Pick the process backend from configuration.
    ///
    /// The hardware backend is used when it is preferred and registered;
    /// otherwise the software backend is used.
    ///
    /// # Errors
    /// Returns `InitError::BackendNotFound` if the software backend is not registered.
    pub fn select(
        &self,
        config: &TransportConfig,
        topology: Arc<dyn JobTopology>,
    ) -> Result<Box<dyn TransportBackend>, InitError> {
        if config.prefer_hardware {
            if let Some(factory) = self.lookup(&config.hardware_backend) {
                info!("Using hardware backend '{}'", config.hardware_backend);
                return Ok(factory(config, topology));
            }
            let available: Vec<&str> = self.entries.iter().map(|&(name, _)| name).collect();
            warn!(
                "Hardware backend '{}' is not available (registered: [{}]), falling back to '{}'",
                config.hardware_backend,
                available.join(", "),
                config.software_backend
            );
        }
        info!("Using software backend '{}'", config.software_backend);
        self.create_backend(&config.software_backend, config, topology)
    }
}
