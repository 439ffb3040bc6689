//! Configuration loader using figment.
//!
//! Layered, multi-source configuration. Priority, lowest to highest:
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`ferrite.{profile}.yaml`)
//! 3. Main config file (`ferrite.yaml` / `ferrite.yml` / `config.yaml`)
//! 4. Environment variables (`FERRITE_*`, `__` as path separator)
//! 5. Programmatic overrides via [`ConfigLoader::merge`]
//!
//! # Example
//!
//! ```rust,ignore
//! use ferrite_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::FerriteConfig;
use super::validation::validate_config;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Creates a profile from `FERRITE_PROFILE` or defaults to Development.
    pub fn from_env() -> Self {
        std::env::var("FERRITE_PROFILE")
            .map(|p| match p.to_lowercase().as_str() {
                "production" | "prod" => Self::Production,
                "development" | "dev" => Self::Development,
                other => Self::Custom(other.to_string()),
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        let p = profile.into();
        self.profile = match p.to_lowercase().as_str() {
            "production" | "prod" => Profile::Production,
            "development" | "dev" => Profile::Development,
            _ => Profile::Custom(p),
        };
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds the user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("ferrite"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: FerriteConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates, and returns the configuration.
    pub fn load(self) -> ConfigResult<FerriteConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: FerriteConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(format!("Failed to extract configuration: {e}")))?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(FerriteConfig::default()));

        // Merge the user's pre-configured figment.
        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = &self.config_file {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Yaml::file(path));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with FERRITE_ prefix");
            figment = figment.merge(
                Env::prefixed("FERRITE_")
                    .split("__")
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
        }

        Ok(figment)
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("ferrite"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Searches for and loads configuration files from the search paths.
    ///
    /// A profile-specific file (`ferrite.{profile}.yaml`) is layered below
    /// the base file found in the same directory.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let base_names = ["ferrite.yaml", "ferrite.yml", "config.yaml", "config.yml"];

        for search_path in self.resolve_search_paths() {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_name = format!("{}.{}.{}", stem, self.profile.as_str(), ext);
                let profile_path = search_path.join(&profile_name);
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = figment.merge(Yaml::file(&profile_path));
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return figment.merge(Yaml::file(&base_path));
                }
            }
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_without_a_file() {
        let config = ConfigLoader::new()
            .without_env()
            .search_path("/nonexistent")
            .load()
            .unwrap();

        assert!(!config.debug);
        assert_eq!(config.logging.level.as_str(), "info");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/ferrite.yaml")
            .load();

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn programmatic_merge_overrides_defaults() {
        let config = ConfigLoader::new()
            .without_env()
            .search_path("/nonexistent")
            .merge(FerriteConfig {
                debug: true,
                ..Default::default()
            })
            .load()
            .unwrap();

        assert!(config.debug);
    }
}
