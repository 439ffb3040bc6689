//! Configuration module for the Ferrite runtime.
//!
//! Provides layered YAML/env configuration loading and validation for the
//! runtime's debug gating, dispatch parallelism, and logging options.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{FerriteConfig, LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use validation::validate_config;
