//! Per-connection bidirectional TCP relay.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::connection::{ConnectionState, ConnectionSummary, Direction};
use super::error::{RelayError, RelayResult};
use super::inspect::{inspect, LogOptions};
use super::metrics::MetricsAggregator;
use super::tracker::ConnectionTracker;
use super::CHUNK_SIZE;
use crate::config::RelayConfig;

/// Relays accepted client connections to a fixed target.
#[derive(Debug, Clone)]
pub struct TcpRelay {
    target_host: String,
    target_port: u16,
    options: LogOptions,
    connect_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    buffer_size: usize,
    metrics: Arc<MetricsAggregator>,
    tracker: Arc<ConnectionTracker>,
}

/// How a direction stopped.
#[derive(Debug)]
enum StreamEnd {
    /// Zero-length read from the source.
    Eof,
    /// The opposite direction already tore the connection down.
    PeerClosed,
    /// Read, write or idle-timeout failure.
    Fault(io::Error),
}

/// Everything one copy direction needs, owned so it can run as its own task.
struct Leg {
    conn_id: u64,
    direction: Direction,
    source: SocketAddr,
    dest: SocketAddr,
    options: LogOptions,
    idle_timeout: Option<Duration>,
    buffer_size: usize,
    metrics: Arc<MetricsAggregator>,
    tracker: Arc<ConnectionTracker>,
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
}

impl TcpRelay {
    /// Create a relay forwarding to `target_host:target_port`.
    pub fn new(
        target_host: impl Into<String>,
        target_port: u16,
        metrics: Arc<MetricsAggregator>,
        tracker: Arc<ConnectionTracker>,
    ) -> Self {
        Self {
            target_host: target_host.into(),
            target_port,
            options: LogOptions::default(),
            connect_timeout: None,
            idle_timeout: None,
            buffer_size: CHUNK_SIZE,
            metrics,
            tracker,
        }
    }

    /// Create a relay from the `target`, `tcp` and `logging` sections.
    pub fn from_config(
        config: &RelayConfig,
        metrics: Arc<MetricsAggregator>,
        tracker: Arc<ConnectionTracker>,
    ) -> Self {
        Self::new(
            config.target.host.clone(),
            config.target.port,
            metrics,
            tracker,
        )
        .with_log_options(LogOptions::from(&config.logging))
        .with_connect_timeout(config.tcp.connect_timeout)
        .with_idle_timeout(config.tcp.idle_timeout)
        .with_buffer_size(config.tcp.buffer_size)
    }

    /// Set payload logging options.
    #[must_use]
    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.options = options;
        self
    }

    /// Bound the upstream connect.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Tear a connection down when a direction sees no data for this long.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the per-read chunk size. Zero is ignored.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        if buffer_size > 0 {
            self.buffer_size = buffer_size;
        }
        self
    }

    /// `host:port` of the target.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    /// Relay one accepted client until both directions have finished.
    ///
    /// `client_addr` is the peer address reported by `accept`.
    ///
    /// Counts the connection as accepted, opens the upstream, and runs the
    /// two copy directions as separate tasks. Faults after the upstream
    /// connect are logged and end the connection; they are not returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the target cannot be resolved or connected. The
    /// client socket is closed in that case.
    pub async fn handle_connection(
        &self,
        client: TcpStream,
        client_addr: SocketAddr,
    ) -> RelayResult<ConnectionSummary> {
        info!(peer = %client_addr, "New connection from {}", client_addr);

        self.metrics.increment_connection();
        let conn_id = self.tracker.track_connection(client_addr);

        let (upstream, target_addr) = match self.connect_upstream().await {
            Ok(connected) => connected,
            Err(e) => {
                error!(conn_id, peer = %client_addr, error = %e, "Upstream connect failed");
                drop(client);
                self.tracker.remove_connection(conn_id);
                self.metrics.decrement_active();
                return Err(e);
            },
        };

        info!(conn_id, target = %target_addr, "Connected to target {}", self.target());
        self.tracker.connected(conn_id, target_addr);

        for stream in [&client, &upstream] {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(conn_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let (client_read, client_write) = client.into_split();
        let (target_read, target_write) = upstream.into_split();

        let (close_tx, close_rx) = watch::channel(false);
        let close_tx = Arc::new(close_tx);

        let leg = |direction: Direction, source: SocketAddr, dest: SocketAddr| Leg {
            conn_id,
            direction,
            source,
            dest,
            options: self.options,
            idle_timeout: self.idle_timeout,
            buffer_size: self.buffer_size,
            metrics: Arc::clone(&self.metrics),
            tracker: Arc::clone(&self.tracker),
            close_tx: Arc::clone(&close_tx),
            close_rx: close_rx.clone(),
        };

        let client_to_target = tokio::spawn(
            leg(Direction::ClientToTarget, client_addr, target_addr).run(client_read, target_write),
        );
        let target_to_client = tokio::spawn(
            leg(Direction::TargetToClient, target_addr, client_addr).run(target_read, client_write),
        );

        let (sent, received) = tokio::join!(client_to_target, target_to_client);
        let bytes_client_to_target = sent.unwrap_or_else(|e| {
            error!(conn_id, error = %e, "Relay task for {} failed", Direction::ClientToTarget);
            0
        });
        let bytes_target_to_client = received.unwrap_or_else(|e| {
            error!(conn_id, error = %e, "Relay task for {} failed", Direction::TargetToClient);
            0
        });

        let duration = self
            .tracker
            .remove_connection(conn_id)
            .map(|info| info.duration())
            .unwrap_or_default();
        self.metrics.decrement_active();

        let summary = ConnectionSummary {
            id: conn_id,
            client_addr,
            target_addr,
            bytes_client_to_target,
            bytes_target_to_client,
            duration,
        };

        info!(
            conn_id,
            peer = %client_addr,
            duration_ms = millis(duration),
            "Connection closed. Total bytes transferred: {}",
            summary.total_bytes()
        );

        Ok(summary)
    }

    /// Resolve the target and connect to the first address that accepts.
    async fn connect_upstream(&self) -> RelayResult<(TcpStream, SocketAddr)> {
        let attempt = async {
            let addrs = lookup_host((self.target_host.as_str(), self.target_port))
                .await
                .map_err(|e| RelayError::Resolve {
                    target: self.target(),
                    reason: e.to_string(),
                })?;

            let mut last_err = None;
            for addr in addrs {
                match TcpStream::connect(addr).await {
                    Ok(stream) => return Ok((stream, addr)),
                    Err(e) => {
                        debug!(target = %addr, error = %e, "Connect attempt failed");
                        last_err = Some(e);
                    },
                }
            }

            Err(match last_err {
                Some(source) => RelayError::Connect {
                    target: self.target(),
                    source,
                },
                None => RelayError::Resolve {
                    target: self.target(),
                    reason: "no addresses found".to_string(),
                },
            })
        };

        match self.connect_timeout {
            Some(limit) => timeout(limit, attempt)
                .await
                .map_err(|_| RelayError::ConnectTimeout {
                    target: self.target(),
                    timeout: limit,
                })?,
            None => attempt.await,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Leg {
    /// Copy `reader` into `writer` until EOF, a fault, or the other
    /// direction closing. Returns the bytes written.
    async fn run(self, mut reader: OwnedReadHalf, mut writer: OwnedWriteHalf) -> u64 {
        let mut buf = vec![0u8; self.buffer_size];
        let mut total = 0u64;
        let mut closed = self.close_rx.clone();

        let end = loop {
            tokio::select! {
                _ = closed.wait_for(|closed| *closed) => break StreamEnd::PeerClosed,
                step = self.step(&mut reader, &mut writer, &mut buf) => match step {
                    Ok(0) => break StreamEnd::Eof,
                    Ok(n) => total += n as u64,
                    Err(e) => break StreamEnd::Fault(e),
                },
            }
        };

        // Either direction ending closes the whole connection.
        self.close_tx.send_replace(true);
        self.tracker
            .update_state(self.conn_id, ConnectionState::Closing);
        if let Err(e) = writer.shutdown().await {
            debug!(conn_id = self.conn_id, direction = %self.direction, error = %e, "Shutdown after close");
        }
        drop(reader);
        drop(writer);

        match end {
            StreamEnd::Eof => {
                debug!(conn_id = self.conn_id, direction = %self.direction, "End of stream");
            },
            StreamEnd::PeerClosed => {
                debug!(conn_id = self.conn_id, direction = %self.direction, "Closed by opposite direction");
            },
            StreamEnd::Fault(e) => {
                error!(conn_id = self.conn_id, direction = %self.direction, error = %e, "Error in {}: {}", self.direction, e);
            },
        }
        info!(
            conn_id = self.conn_id,
            "Connection closed ({}). Total bytes transferred: {}",
            self.direction,
            total
        );

        total
    }

    /// One read from the source and one full write to the destination.
    async fn step(
        &self,
        reader: &mut OwnedReadHalf,
        writer: &mut OwnedWriteHalf,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let n = match self.idle_timeout {
            Some(idle) => timeout(idle, reader.read(buf)).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data for {}s", idle.as_secs_f64()),
                )
            })??,
            None => reader.read(buf).await?,
        };
        if n == 0 {
            return Ok(0);
        }

        let chunk = &buf[..n];
        writer.write_all(chunk).await?;

        self.metrics.add_bytes(n as u64);
        self.tracker.record_bytes(self.conn_id, self.direction, n as u64);
        if self.options.enabled() {
            inspect(chunk, self.source, self.dest, self.direction, self.options.full_dump);
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn relay_to(addr: SocketAddr) -> (TcpRelay, Arc<MetricsAggregator>, Arc<ConnectionTracker>) {
        let metrics = Arc::new(MetricsAggregator::new());
        let tracker = Arc::new(ConnectionTracker::new());
        let relay = TcpRelay::new(
            addr.ip().to_string(),
            addr.port(),
            Arc::clone(&metrics),
            Arc::clone(&tracker),
        )
        .with_connect_timeout(Some(Duration::from_secs(2)));
        (relay, metrics, tracker)
    }

    /// Accept one client on a fresh listener and return both ends.
    async fn accepted_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();
        (client, server_side, peer)
    }

    #[test]
    fn test_builder() {
        let metrics = Arc::new(MetricsAggregator::new());
        let tracker = Arc::new(ConnectionTracker::new());
        let relay = TcpRelay::new("example.com", 443, metrics, tracker)
            .with_buffer_size(0)
            .with_idle_timeout(Some(Duration::from_secs(30)));

        assert_eq!(relay.target(), "example.com:443");
        assert_eq!(relay.buffer_size, CHUNK_SIZE);
        assert_eq!(relay.idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_config() {
        let mut config = RelayConfig::default();
        config.target.host = "10.1.2.3".to_string();
        config.target.port = 5432;
        config.logging.full_dump = true;
        config.tcp.buffer_size = 1024;

        let relay = TcpRelay::from_config(
            &config,
            Arc::new(MetricsAggregator::new()),
            Arc::new(ConnectionTracker::new()),
        );
        assert_eq!(relay.target(), "10.1.2.3:5432");
        assert!(relay.options.log_data);
        assert!(relay.options.full_dump);
        assert_eq!(relay.buffer_size, 1024);
        assert_eq!(relay.connect_timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_connect_failure_closes_client() {
        // Reserve a port, then free it so nothing listens there.
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = unused.local_addr().unwrap();
        drop(unused);

        let (relay, metrics, tracker) = relay_to(dead_addr);
        let (mut client, server_side, peer) = accepted_pair().await;

        let result = relay.handle_connection(server_side, peer).await;
        assert!(result.unwrap_err().is_upstream());

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 1);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn test_reset_before_relay_is_counted() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (relay, metrics, tracker) = relay_to(upstream.local_addr().unwrap());
        let (client, server_side, peer) = accepted_pair().await;

        // Abortive close: the peer is gone before the relay touches the socket.
        client.set_linger(Some(Duration::ZERO)).unwrap();
        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let relay_task = tokio::spawn(async move { relay.handle_connection(server_side, peer).await });
        let _target = upstream.accept().await.unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(2), relay_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.client_addr, peer);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 1);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_relays_both_directions() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (relay, metrics, tracker) = relay_to(upstream.local_addr().unwrap());
        let (mut client, server_side, peer) = accepted_pair().await;

        let relay_task = tokio::spawn(async move { relay.handle_connection(server_side, peer).await });
        let (mut target, _) = upstream.accept().await.unwrap();

        client.write_all(b"hello target").await.unwrap();
        let mut buf = [0u8; 12];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello target");

        target.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert_eq!(tracker.active_connections(), 1);

        drop(client);
        let summary = tokio::time::timeout(Duration::from_secs(2), relay_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(summary.bytes_client_to_target, 12);
        assert_eq!(summary.bytes_target_to_client, 2);
        assert_eq!(metrics.snapshot().bytes_transferred, 14);
        assert_eq!(metrics.snapshot().active_connections, 0);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_target_close_closes_client() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (relay, _metrics, _tracker) = relay_to(upstream.local_addr().unwrap());
        let (mut client, server_side, peer) = accepted_pair().await;

        let relay_task = tokio::spawn(async move { relay.handle_connection(server_side, peer).await });
        let (target, _) = upstream.accept().await.unwrap();
        drop(target);

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        tokio::time::timeout(Duration::from_secs(2), relay_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_tears_down() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (relay, metrics, _tracker) = relay_to(upstream.local_addr().unwrap());
        let relay = relay.with_idle_timeout(Some(Duration::from_millis(100)));
        let (mut client, server_side, peer) = accepted_pair().await;

        let relay_task = tokio::spawn(async move { relay.handle_connection(server_side, peer).await });
        let (_target, _) = upstream.accept().await.unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(2), relay_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.total_bytes(), 0);
        assert_eq!(metrics.snapshot().active_connections, 0);

        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_data_logging_does_not_alter_stream() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (relay, _metrics, _tracker) = relay_to(upstream.local_addr().unwrap());
        let relay = relay.with_log_options(LogOptions {
            log_data: true,
            full_dump: true,
        });
        let (mut client, server_side, peer) = accepted_pair().await;

        let relay_task = tokio::spawn(async move { relay.handle_connection(server_side, peer).await });
        let (mut target, _) = upstream.accept().await.unwrap();

        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        client.write_all(&payload).await.unwrap();

        let mut received = vec![0u8; payload.len()];
        target.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        drop(client);
        let summary = relay_task.await.unwrap().unwrap();
        assert_eq!(summary.bytes_client_to_target, payload.len() as u64);
    }
}
