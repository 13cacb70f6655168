//! Loading engine configuration from YAML, `.env` and the environment.
//!
//! Precedence, lowest first: built-in defaults, `keystone.yaml`, environment
//! variables (optionally seeded from `.env`).

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::types::EngineConfig;

/// Overrides `concurrency`.
pub const ENV_CONCURRENCY: &str = "KEYSTONE_CONCURRENCY";
/// Overrides `state.path`.
pub const ENV_STATE_PATH: &str = "KEYSTONE_STATE_PATH";
/// Overrides `import.workspace_id`.
pub const ENV_WORKSPACE_ID: &str = "KEYSTONE_WORKSPACE_ID";
/// Overrides `import.enabled`.
pub const ENV_IMPORT_ENABLED: &str = "KEYSTONE_IMPORT_ENABLED";

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["keystone.yaml", "keystone.yml"];

/// Loads [`EngineConfig`].
#[derive(Debug, Default)]
pub struct ConfigParser {
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a parser resolving `.env` against the working directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Resolves `.env` against `path` instead.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or invalid YAML.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<EngineConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string. An empty document yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or has unknown keys.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<EngineConfig> {
        if content.trim().is_empty() {
            debug!("Empty configuration, using defaults");
            return Ok(EngineConfig::default());
        }

        let config = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;
        Ok(config)
    }

    /// Loads a file (or the defaults when `path` is `None`) and applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is invalid.
    pub fn load_with_env(&self, path: Option<&Path>) -> Result<EngineConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => EngineConfig::default(),
        };
        apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }
        Ok(())
    }
}

/// Applies `KEYSTONE_*` overrides read through `lookup`.
///
/// # Errors
///
/// Returns an error if a numeric or boolean override cannot be parsed.
pub fn apply_env_overrides(
    config: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<(), ConfigError> {
    if let Some(value) = lookup(ENV_CONCURRENCY) {
        debug!("Overriding concurrency from environment");
        config.concurrency = value.trim().parse().map_err(|_| invalid_env(ENV_CONCURRENCY, &value))?;
    }

    if let Some(value) = lookup(ENV_STATE_PATH) {
        debug!("Overriding state.path from environment");
        config.state.path = PathBuf::from(value);
    }

    if let Some(value) = lookup(ENV_WORKSPACE_ID) {
        debug!("Overriding import.workspace_id from environment");
        config.import.workspace_id = Some(value);
    }

    if let Some(value) = lookup(ENV_IMPORT_ENABLED) {
        debug!("Overriding import.enabled from environment");
        config.import.enabled = parse_bool(&value).ok_or_else(|| invalid_env(ENV_IMPORT_ENABLED, &value))?;
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid_env(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvVar {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Finds a configuration file in `start_dir` or any parent directory.
///
/// Returns `None` if there is none.
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();
    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let candidate = current.join(filename);
            if candidate.exists() {
                info!("Found configuration file: {}", candidate.display());
                return Some(candidate);
            }
        }
        if !current.pop() {
            return None;
        }
    }
}
