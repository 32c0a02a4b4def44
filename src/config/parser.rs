//! Configuration and manifest loading.
//!
//! Client configuration comes from a YAML file (optional), then `.env`,
//! then `AZMC_*` environment variables, in increasing precedence.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, MultiCloudError, Result};

use super::manifest::Manifest;
use super::spec::ClientConfig;
use super::validator::ConfigValidator;

/// Configuration parser for loading client configuration and manifests.
///
/// Relative lookups (`.env`, default config files) start in the working
/// directory.
#[derive(Debug, Default)]
pub struct ConfigParser;

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads the effective client configuration.
    ///
    /// An explicit path must exist. Without one, the usual locations are
    /// searched and defaults are used when nothing is found.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, an environment
    /// override is malformed, or the result fails validation.
    pub fn load(&self, explicit: Option<&Path>) -> Result<ClientConfig> {
        self.load_dotenv()?;

        let mut config = match explicit {
            Some(path) => self.load_file(path)?,
            None => match find_config_file(".") {
                Some(path) => self.load_file(path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    ClientConfig::default()
                }
            },
        };

        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        ConfigValidator::new().validate_config(&config)?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ClientConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = read_file(path)?;
        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ClientConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(ClientConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            MultiCloudError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Applies `AZMC_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] if a numeric variable does not parse.
    pub fn apply_env_overrides<F>(config: &mut ClientConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("AZMC_BASE_PATH") {
            debug!("Overriding base_path from environment");
            config.base_path = Some(base);
        }

        if let Some(token) = lookup("AZMC_ACCESS_TOKEN") {
            debug!("Overriding access_token from environment");
            config.access_token = Some(token);
        }

        if let Some(agent) = lookup("AZMC_USER_AGENT") {
            debug!("Overriding user_agent from environment");
            config.user_agent = agent;
        }

        if let Some(dir) = lookup("AZMC_STATE_DIR") {
            debug!("Overriding state_dir from environment");
            config.state_dir = Some(PathBuf::from(dir));
        }

        if let Some(value) = lookup("AZMC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_env("AZMC_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = lookup("AZMC_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env("AZMC_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = lookup("AZMC_POLL_TIMEOUT_SECS") {
            config.poll.timeout_secs = parse_env("AZMC_POLL_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = PathBuf::from(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                MultiCloudError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Loads every manifest document in a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a document is invalid.
    pub fn load_manifests(&self, path: impl AsRef<Path>) -> Result<Vec<Manifest>> {
        let path = path.as_ref();
        info!("Loading manifests from: {}", path.display());

        let content = read_file(path)?;
        self.parse_manifests(&content, Some(path))
    }

    /// Parses a multi-document YAML string into manifests.
    ///
    /// # Errors
    ///
    /// Returns an error if a document is not a valid manifest.
    pub fn parse_manifests(&self, content: &str, source: Option<&Path>) -> Result<Vec<Manifest>> {
        let mut manifests = Vec::new();

        for (i, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| parse_error(&e, i, source))?;
            if value.is_null() {
                continue;
            }
            let manifest: Manifest =
                serde_yaml::from_value(value).map_err(|e| parse_error(&e, i, source))?;
            manifests.push(manifest);
        }

        debug!("Parsed {} manifest(s)", manifests.len());
        Ok(manifests)
    }
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(MultiCloudError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    std::fs::read_to_string(path).map_err(|e| {
        MultiCloudError::Config(ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })
    })
}

fn parse_error(err: &serde_yaml::Error, document: usize, source: Option<&Path>) -> MultiCloudError {
    MultiCloudError::Config(ConfigError::ParseError {
        message: format!("document {document}: {err}"),
        location: source.map(|p| p.display().to_string()),
    })
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        MultiCloudError::Config(ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: value.to_string(),
        })
    })
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["azmc.yaml", "azmc.yml"];

/// Finds the configuration file in `start_dir`, then in the user config
/// directory (`<config_dir>/azmc/config.yaml`).
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let start = start_dir.as_ref();

    for filename in DEFAULT_CONFIG_FILES {
        let config_path = start.join(filename);
        if config_path.exists() {
            info!("Found configuration file: {}", config_path.display());
            return Some(config_path);
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("azmc").join("config.yaml"))
        .filter(|path| path.exists())
}
