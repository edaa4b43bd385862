//! Built-in transport backends.
//!
//! Hardware-progress backends are registered by the embedding application
//! through `BackendRegistry::with_backend`.

pub mod tcp;
