//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file '{path}': {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write configuration file '{path}': {source}")]
    WriteError {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML content.
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// An environment override could not be applied.
    #[error("invalid value for environment variable {name}: {reason}")]
    EnvError {
        /// Variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A dotenv file could not be read or parsed.
    #[error("failed to load environment file '{path}': {reason}")]
    EnvFileError {
        /// Path to the dotenv file.
        path: PathBuf,
        /// Parser or IO message.
        reason: String,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_error_display() {
        let err = ConfigError::EnvError {
            name: "PROXY_PORT".to_string(),
            reason: "not a port number: abc".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PROXY_PORT"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_not_found_display() {
        let err = ConfigError::NotFound(PathBuf::from("/etc/l4-relay/relay.toml"));
        assert!(err.to_string().contains("/etc/l4-relay/relay.toml"));
    }
}
