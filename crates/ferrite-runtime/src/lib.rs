//! # Ferrite Runtime
//!
//! Runtime orchestration for the Ferrite plugin runtime:
//!
//! - **Registry** ([`registry`]) - plugin discovery, instantiation, handler
//!   offering, and the per-plugin load state machine.
//! - **Runtime** ([`runtime`]) - the explicit context object owning clients,
//!   registry, and the shutdown drain barrier; signal handling; the bounded
//!   dispatch worker pool.
//! - **Config** ([`config`]) - layered YAML/env configuration.
//! - **Logging** ([`logging`]) - tracing-subscriber bootstrap.

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod runtime;

pub use config::{ConfigLoader, FerriteConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use registry::{Gate, PLUGINS, PluginDescriptor, PluginRegistry, PluginState};
pub use runtime::{FerriteRuntime, RuntimeBuilder};
