//! Error types for the relay.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors surfaced by the relay.
///
/// Faults inside an established TCP connection or a UDP reply wait are logged
/// and absorbed; only the variants below ever reach a caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO error on a socket the caller handed over.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Target host did not resolve to any address.
    #[error("failed to resolve target {target}: {reason}")]
    Resolve {
        /// `host:port` that was looked up.
        target: String,
        /// Resolver message.
        reason: String,
    },

    /// Upstream connect was refused or failed.
    #[error("failed to connect to target {target}: {source}")]
    Connect {
        /// `host:port` being connected to.
        target: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Upstream connect did not complete in time.
    #[error("connection to target {target} timed out after {timeout:?}")]
    ConnectTimeout {
        /// `host:port` being connected to.
        target: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// A listening socket could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Requested address.
        address: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Whether this error concerns reaching the target rather than local setup.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RelayError::Resolve { .. } | RelayError::Connect { .. } | RelayError::ConnectTimeout { .. }
        )
    }
}
