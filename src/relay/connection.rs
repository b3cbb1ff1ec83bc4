//! Connection information and direction tagging.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One half-duplex leg of a relayed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the client and written to the target.
    ClientToTarget,
    /// Bytes read from the target and written to the client.
    TargetToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToTarget => write!(f, "CLIENT->TARGET"),
            Direction::TargetToClient => write!(f, "TARGET->CLIENT"),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upstream connect in progress.
    Connecting,
    /// Both directions are relaying.
    Active,
    /// One direction ended; waiting for the other to wind down.
    Closing,
    /// Both sockets released.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Active => write!(f, "active"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Information about a single relayed TCP connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique connection ID.
    pub id: u64,

    /// Client endpoint.
    pub client_addr: SocketAddr,

    /// Upstream endpoint, once connected.
    pub target_addr: Option<SocketAddr>,

    /// Connection state.
    pub state: ConnectionState,

    /// Time the connection was accepted.
    pub connected_at: Instant,

    /// Bytes written to the target.
    pub bytes_client_to_target: u64,

    /// Bytes written to the client.
    pub bytes_target_to_client: u64,
}

impl ConnectionInfo {
    /// Create info for a freshly accepted client.
    #[must_use]
    pub fn new(id: u64, client_addr: SocketAddr) -> Self {
        Self {
            id,
            client_addr,
            target_addr: None,
            state: ConnectionState::Connecting,
            connected_at: Instant::now(),
            bytes_client_to_target: 0,
            bytes_target_to_client: 0,
        }
    }

    /// Add bytes relayed in `direction`.
    pub fn record(&mut self, direction: Direction, bytes: u64) {
        match direction {
            Direction::ClientToTarget => self.bytes_client_to_target += bytes,
            Direction::TargetToClient => self.bytes_target_to_client += bytes,
        }
    }

    /// Get connection duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Final accounting for a connection after both directions finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Connection ID.
    pub id: u64,
    /// Client endpoint.
    pub client_addr: SocketAddr,
    /// Upstream endpoint.
    pub target_addr: SocketAddr,
    /// Bytes written to the target.
    pub bytes_client_to_target: u64,
    /// Bytes written to the client.
    pub bytes_target_to_client: u64,
    /// Time from accept to full teardown.
    pub duration: Duration,
}

impl ConnectionSummary {
    /// Total bytes transferred.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes_client_to_target + self.bytes_target_to_client
    }
}
