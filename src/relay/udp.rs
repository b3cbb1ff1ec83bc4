//! Datagram relay with one short-lived upstream socket per datagram.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::connection::Direction;
use super::error::{RelayError, RelayResult};
use super::inspect::{inspect, LogOptions};
use super::metrics::MetricsAggregator;
use super::tracker::{ConnectionTracker, UdpSessionGuard};
use super::CHUNK_SIZE;
use crate::config::RelayConfig;

/// Largest datagram relayed in either direction. Longer datagrams are truncated.
pub const MAX_DATAGRAM: usize = CHUNK_SIZE;

/// Default wait for the upstream reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// UDP relay bound to a listening socket.
#[derive(Debug)]
pub struct UdpRelay {
    socket: Arc<UdpSocket>,
    target_host: String,
    target_port: u16,
    options: LogOptions,
    reply_timeout: Duration,
    metrics: Arc<MetricsAggregator>,
    tracker: Arc<ConnectionTracker>,
}

impl UdpRelay {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] when `listen_addr` cannot be bound.
    pub async fn bind(
        listen_addr: SocketAddr,
        target_host: impl Into<String>,
        target_port: u16,
        metrics: Arc<MetricsAggregator>,
        tracker: Arc<ConnectionTracker>,
    ) -> RelayResult<Self> {
        let socket = UdpSocket::bind(listen_addr)
            .await
            .map_err(|source| RelayError::Bind {
                address: listen_addr,
                source,
            })?;

        Ok(Self {
            socket: Arc::new(socket),
            target_host: target_host.into(),
            target_port,
            options: LogOptions::default(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            metrics,
            tracker,
        })
    }

    /// Bind `listen_addr` and take target, timeout and logging from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] when `listen_addr` cannot be bound.
    pub async fn from_config(
        listen_addr: SocketAddr,
        config: &RelayConfig,
        metrics: Arc<MetricsAggregator>,
        tracker: Arc<ConnectionTracker>,
    ) -> RelayResult<Self> {
        Ok(Self::bind(
            listen_addr,
            config.target.host.clone(),
            config.target.port,
            metrics,
            tracker,
        )
        .await?
        .with_log_options(LogOptions::from(&config.logging))
        .with_reply_timeout(config.udp.reply_timeout))
    }

    /// Set payload logging options.
    #[must_use]
    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.options = options;
        self
    }

    /// Set how long each session waits for its reply.
    #[must_use]
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Address the listening socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive and forward datagrams until `shutdown` fires.
    ///
    /// Per-datagram faults are logged and never stop the loop.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let local = self.local_addr().ok();
        info!(address = ?local, "UDP relay listening");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, client_addr)) => {
                        if let Err(e) = self.forward(&buf[..n], client_addr).await {
                            error!(client = %client_addr, error = %e, "UDP Error: {}", e);
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "UDP Error: {}", e);
                    },
                },
                _ = shutdown.recv() => {
                    info!("UDP relay shutting down");
                    break;
                },
            }
        }
    }

    /// Send one datagram upstream from a fresh socket and spawn its reply wait.
    async fn forward(&self, data: &[u8], client_addr: SocketAddr) -> RelayResult<()> {
        let target_addr = self.resolve_target().await?;
        let bind_addr = ephemeral_addr_for(target_addr);
        let upstream = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| RelayError::Bind {
                address: bind_addr,
                source,
            })?;
        upstream
            .connect(target_addr)
            .await
            .map_err(|source| RelayError::Connect {
                target: self.target(),
                source,
            })?;

        let session = UdpSessionGuard::open(
            Arc::clone(&self.tracker),
            client_addr,
            target_addr,
            upstream.local_addr()?,
        );
        debug!(session = session.id(), client = %client_addr, target = %target_addr, "UDP session opened");

        if self.options.enabled() {
            inspect(data, client_addr, target_addr, Direction::ClientToTarget, self.options.full_dump);
        }
        let sent = upstream.send(data).await?;
        self.metrics.add_bytes(sent as u64);

        tokio::spawn(await_reply(ReplyWait {
            session,
            upstream,
            listener: Arc::clone(&self.socket),
            client_addr,
            target_addr,
            reply_timeout: self.reply_timeout,
            options: self.options,
            metrics: Arc::clone(&self.metrics),
        }));

        Ok(())
    }

    async fn resolve_target(&self) -> RelayResult<SocketAddr> {
        lookup_host((self.target_host.as_str(), self.target_port))
            .await
            .map_err(|e| RelayError::Resolve {
                target: self.target(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| RelayError::Resolve {
                target: self.target(),
                reason: "no addresses found".to_string(),
            })
    }

    fn target(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }
}

/// Unspecified address of the same family as `target`, on an OS-chosen port.
fn ephemeral_addr_for(target: SocketAddr) -> SocketAddr {
    let ip = match target.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

/// State owned by one reply-wait task.
struct ReplyWait {
    session: UdpSessionGuard,
    upstream: UdpSocket,
    listener: Arc<UdpSocket>,
    client_addr: SocketAddr,
    target_addr: SocketAddr,
    reply_timeout: Duration,
    options: LogOptions,
    metrics: Arc<MetricsAggregator>,
}

/// Wait for at most one reply and hand it back to the client.
///
/// The upstream socket and the session are released on every path.
async fn await_reply(wait: ReplyWait) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    match timeout(wait.reply_timeout, wait.upstream.recv(&mut buf)).await {
        Ok(Ok(n)) => {
            let reply = &buf[..n];
            match wait.listener.send_to(reply, wait.client_addr).await {
                Ok(sent) => {
                    wait.metrics.add_bytes(sent as u64);
                    if wait.options.enabled() {
                        inspect(
                            reply,
                            wait.target_addr,
                            wait.client_addr,
                            Direction::TargetToClient,
                            wait.options.full_dump,
                        );
                    }
                },
                Err(e) => {
                    error!(session = wait.session.id(), client = %wait.client_addr, error = %e, "UDP Response Error: {}", e);
                },
            }
        },
        Ok(Err(e)) => {
            error!(session = wait.session.id(), target = %wait.target_addr, error = %e, "UDP Response Error: {}", e);
        },
        Err(_) => {
            warn!(
                session = wait.session.id(),
                target = %wait.target_addr,
                "UDP Response Error: no reply within {}s",
                wait.reply_timeout.as_secs_f64()
            );
        },
    }
}
