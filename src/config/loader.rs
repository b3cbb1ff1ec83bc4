//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::RelayConfig;
use super::validation::Validator;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable overriding the TCP listen port.
pub const ENV_PROXY_PORT: &str = "PROXY_PORT";
/// Environment variable overriding the target host.
pub const ENV_TARGET_HOST: &str = "TARGET_HOST";
/// Environment variable overriding the target port.
pub const ENV_TARGET_PORT: &str = "TARGET_PORT";
/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "PROXY_LOG_LEVEL";

/// Dotenv file read from the working directory.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<RelayConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<RelayConfig> {
        let config: RelayConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Load configuration or return default if file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<RelayConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(RelayConfig::default())
        }
    }

    /// Run every registered validator. Warnings are logged, errors fail.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` listing every error found.
    pub fn validate(&self, config: &RelayConfig) -> ConfigResult<()> {
        let mut messages = Vec::new();
        for validator in &self.validators {
            let result = validator.validate(config);
            for warning in result.warnings() {
                warn!(field = %warning.field, "{}", warning.message);
            }
            messages.extend(
                result
                    .errors()
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message)),
            );
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(messages.join("; ")))
        }
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save<P: AsRef<Path>>(&self, config: &RelayConfig, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(config)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

/// Apply overrides from the process environment.
///
/// Recognized variables: `PROXY_PORT`, `TARGET_HOST`, `TARGET_PORT`,
/// `PROXY_LOG_LEVEL`.
///
/// # Errors
///
/// Returns `ConfigError::EnvError` if a variable is set to an unparsable value.
pub fn apply_env(config: &mut RelayConfig) -> ConfigResult<()> {
    apply_env_with(config, |name| std::env::var(name).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// # Errors
///
/// Returns `ConfigError::EnvError` if a variable is set to an unparsable value.
pub fn apply_env_with<F>(config: &mut RelayConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(ENV_PROXY_PORT) {
        config.listen.port = parse_port(ENV_PROXY_PORT, &port)?;
        debug!("Listen port overridden to {}", config.listen.port);
    }

    if let Some(host) = lookup(ENV_TARGET_HOST) {
        if host.trim().is_empty() {
            return Err(ConfigError::EnvError {
                name: ENV_TARGET_HOST.into(),
                reason: "host cannot be empty".into(),
            });
        }
        config.target.host = host;
        debug!("Target host overridden to {}", config.target.host);
    }

    if let Some(port) = lookup(ENV_TARGET_PORT) {
        config.target.port = parse_port(ENV_TARGET_PORT, &port)?;
        debug!("Target port overridden to {}", config.target.port);
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.logging.level = level.parse().map_err(|reason| ConfigError::EnvError {
            name: ENV_LOG_LEVEL.into(),
            reason,
        })?;
        debug!("Log level overridden to {}", config.logging.level);
    }

    Ok(())
}

/// Apply overrides from the process environment, falling back to the
/// `KEY=value` entries of a dotenv file.
///
/// Process variables win over file entries.
///
/// # Errors
///
/// Returns `ConfigError::EnvFileError` if the file cannot be read or parsed,
/// and `ConfigError::EnvError` for unparsable values.
pub fn apply_env_file<P: AsRef<Path>>(config: &mut RelayConfig, path: P) -> ConfigResult<()> {
    apply_env_file_with(config, path, |name| std::env::var(name).ok())
}

/// Like [`apply_env_file`], resolving process variables through `lookup`.
///
/// # Errors
///
/// Same as [`apply_env_file`].
pub fn apply_env_file_with<P, F>(config: &mut RelayConfig, path: P, lookup: F) -> ConfigResult<()>
where
    P: AsRef<Path>,
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    let file_error = |e: dotenvy::Error| ConfigError::EnvFileError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut file_vars = HashMap::new();
    for entry in dotenvy::from_path_iter(path).map_err(file_error)? {
        let (key, value) = entry.map_err(file_error)?;
        file_vars.insert(key, value);
    }
    debug!(path = %path.display(), entries = file_vars.len(), "Loaded dotenv file");

    apply_env_with(config, |name| {
        lookup(name).or_else(|| file_vars.get(name).cloned())
    })
}

fn parse_port(name: &str, value: &str) -> ConfigResult<u16> {
    value.trim().parse().map_err(|_| ConfigError::EnvError {
        name: name.into(),
        reason: format!("not a port number: {value}"),
    })
}
