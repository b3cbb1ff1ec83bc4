//! Registry of live TCP connections and in-flight UDP sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::debug;

use super::connection::{ConnectionInfo, ConnectionState, Direction};

/// Connection tracker for monitoring live relays.
#[derive(Debug)]
pub struct ConnectionTracker {
    /// Live TCP connections by ID.
    connections: RwLock<HashMap<u64, ConnectionInfo>>,

    /// In-flight UDP sessions by ID.
    udp_sessions: RwLock<HashMap<u64, UdpSession>>,

    /// Next ID, shared by connections and sessions.
    next_id: AtomicU64,

    /// UDP sessions ever opened.
    udp_sessions_total: AtomicU64,
}

/// One UDP exchange: a client datagram and the ephemeral socket awaiting its
/// reply.
#[derive(Debug, Clone)]
pub struct UdpSession {
    /// Session ID.
    pub id: u64,

    /// Client endpoint the reply goes back to.
    pub client_addr: SocketAddr,

    /// Target endpoint the datagram was sent to.
    pub target_addr: SocketAddr,

    /// Local address of the dedicated upstream socket.
    pub upstream_local_addr: SocketAddr,

    /// Session creation time.
    pub created_at: Instant,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            udp_sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            udp_sessions_total: AtomicU64::new(0),
        }
    }

    /// Generate a new unique ID.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Track a newly accepted TCP client.
    pub fn track_connection(&self, client_addr: SocketAddr) -> u64 {
        let id = self.next_id();
        write(&self.connections).insert(id, ConnectionInfo::new(id, client_addr));
        id
    }

    /// Record the upstream endpoint and mark the connection active.
    pub fn connected(&self, id: u64, target_addr: SocketAddr) {
        if let Some(conn) = write(&self.connections).get_mut(&id) {
            conn.target_addr = Some(target_addr);
            conn.state = ConnectionState::Active;
        }
    }

    /// Update connection state.
    pub fn update_state(&self, id: u64, state: ConnectionState) {
        if let Some(conn) = write(&self.connections).get_mut(&id) {
            conn.state = state;
        }
    }

    /// Add bytes relayed in `direction`.
    pub fn record_bytes(&self, id: u64, direction: Direction, bytes: u64) {
        if let Some(conn) = write(&self.connections).get_mut(&id) {
            conn.record(direction, bytes);
        }
    }

    /// Remove a tracked connection, returning its final info.
    pub fn remove_connection(&self, id: u64) -> Option<ConnectionInfo> {
        write(&self.connections).remove(&id).map(|mut info| {
            info.state = ConnectionState::Closed;
            info
        })
    }

    /// Get number of live TCP connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        read(&self.connections).len()
    }

    /// Register a UDP session. Every datagram gets its own session.
    pub fn open_udp_session(
        &self,
        client_addr: SocketAddr,
        target_addr: SocketAddr,
        upstream_local_addr: SocketAddr,
    ) -> u64 {
        let id = self.next_id();
        let session = UdpSession {
            id,
            client_addr,
            target_addr,
            upstream_local_addr,
            created_at: Instant::now(),
        };
        write(&self.udp_sessions).insert(id, session);
        self.udp_sessions_total.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Remove a UDP session.
    pub fn close_udp_session(&self, id: u64) -> Option<UdpSession> {
        write(&self.udp_sessions).remove(&id)
    }

    /// Get number of in-flight UDP sessions.
    #[must_use]
    pub fn active_udp_sessions(&self) -> usize {
        read(&self.udp_sessions).len()
    }

    /// UDP sessions opened since start.
    #[must_use]
    pub fn total_udp_sessions(&self) -> u64 {
        self.udp_sessions_total.load(Ordering::Relaxed)
    }
}

/// Removes a UDP session from the tracker when dropped.
#[derive(Debug)]
pub struct UdpSessionGuard {
    tracker: Arc<ConnectionTracker>,
    id: u64,
}

impl UdpSessionGuard {
    /// Open a session on `tracker` that lives as long as the guard.
    #[must_use]
    pub fn open(
        tracker: Arc<ConnectionTracker>,
        client_addr: SocketAddr,
        target_addr: SocketAddr,
        upstream_local_addr: SocketAddr,
    ) -> Self {
        let id = tracker.open_udp_session(client_addr, target_addr, upstream_local_addr);
        Self { tracker, id }
    }

    /// Session ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for UdpSessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.tracker.close_udp_session(self.id) {
            debug!(
                session = session.id,
                client = %session.client_addr,
                target = %session.target_addr,
                upstream = %session.upstream_local_addr,
                age_ms = u64::try_from(session.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                "UDP session closed"
            );
        }
    }
}
