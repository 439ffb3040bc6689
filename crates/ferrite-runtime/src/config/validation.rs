//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{FerriteConfig, LogOutput};

/// Validates the entire configuration.
pub fn validate_config(config: &FerriteConfig) -> ConfigResult<()> {
    if config.parallelism == Some(0) {
        return Err(ConfigError::validation(
            "Parallelism must be greater than 0",
        ));
    }

    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }

    if config.logging.filters.keys().any(|module| module.is_empty()) {
        return Err(ConfigError::validation(
            "Logging filter module names cannot be empty",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LoggingConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&FerriteConfig::default()).is_ok());
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let config = FerriteConfig {
            parallelism: Some(0),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn file_output_requires_a_path() {
        let config = FerriteConfig {
            logging: LoggingConfig {
                output: LogOutput::File,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
