//! Listener wiring: TCP accept loop, optional UDP relay and metrics reporting.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::{RelayError, RelayResult};
use super::metrics::{MetricsAggregator, MetricsReporter};
use super::tcp::TcpRelay;
use super::tracker::ConnectionTracker;
use super::udp::UdpRelay;
use crate::config::{BasicValidator, ConfigLoader, RelayConfig};

/// A bound relay, ready to run.
#[derive(Debug)]
pub struct RelayServer {
    config: RelayConfig,
    listener: TcpListener,
    udp: Option<UdpRelay>,
    tcp_relay: Arc<TcpRelay>,
    metrics: Arc<MetricsAggregator>,
    tracker: Arc<ConnectionTracker>,
}

/// Handle to a relay running in the background.
#[derive(Debug)]
pub struct RelayHandle {
    local_addr: SocketAddr,
    udp_local_addr: Option<SocketAddr>,
    metrics: Arc<MetricsAggregator>,
    tracker: Arc<ConnectionTracker>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Bind the TCP listener and, when enabled, the UDP socket on the next port.
    ///
    /// With a listen port of 0 the UDP relay binds to the OS-assigned TCP
    /// port + 1.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if `config` fails validation or
    /// the TCP port leaves no room for UDP, and [`RelayError::Bind`] if
    /// either socket cannot be bound.
    pub async fn bind(config: RelayConfig) -> RelayResult<Self> {
        ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .validate(&config)
            .map_err(|e| RelayError::InvalidConfig(e.to_string()))?;

        let tcp_addr = config.tcp_listen_addr();
        let listener = TcpListener::bind(tcp_addr)
            .await
            .map_err(|source| RelayError::Bind {
                address: tcp_addr,
                source,
            })?;
        let bound = listener.local_addr()?;

        let metrics = Arc::new(MetricsAggregator::new());
        let tracker = Arc::new(ConnectionTracker::new());

        let udp = if config.udp.enabled {
            let port = bound.port().checked_add(1).ok_or_else(|| {
                RelayError::InvalidConfig(format!(
                    "UDP listens on TCP port + 1, but TCP port is {}",
                    bound.port()
                ))
            })?;
            let udp_addr = SocketAddr::new(bound.ip(), port);
            Some(
                UdpRelay::from_config(
                    udp_addr,
                    &config,
                    Arc::clone(&metrics),
                    Arc::clone(&tracker),
                )
                .await?,
            )
        } else {
            None
        };

        let tcp_relay = Arc::new(TcpRelay::from_config(
            &config,
            Arc::clone(&metrics),
            Arc::clone(&tracker),
        ));

        Ok(Self {
            config,
            listener,
            udp,
            tcp_relay,
            metrics,
            tracker,
        })
    }

    /// Bound TCP address.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Bound UDP address, if the UDP relay is enabled.
    #[must_use]
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|udp| udp.local_addr().ok())
    }

    /// Shared metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    /// Shared connection tracker.
    #[must_use]
    pub fn tracker(&self) -> Arc<ConnectionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Run until `shutdown` fires.
    ///
    /// Connections already in flight keep running after the accept loop stops.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let Self {
            config,
            listener,
            udp,
            tcp_relay,
            metrics,
            tracker: _,
        } = self;

        let reporter = config
            .metrics
            .enabled
            .then(|| MetricsReporter::new(Arc::clone(&metrics), config.metrics.interval).spawn());

        let udp_task = udp.map(|udp| tokio::spawn(udp.run(shutdown.resubscribe())));

        info!(
            address = ?listener.local_addr().ok(),
            target = %config.target,
            "TCP listener started"
        );

        loop {
            tokio::select! {
                accept_result = listener.accept() => match accept_result {
                    Ok((client, client_addr)) => {
                        let relay = Arc::clone(&tcp_relay);
                        tokio::spawn(async move {
                            if let Err(e) = relay.handle_connection(client, client_addr).await {
                                debug!(peer = %client_addr, error = %e, "Connection ended with error");
                            }
                        });
                    },
                    Err(e) => {
                        if is_fatal_accept_error(&e) {
                            error!(error = %e, "Fatal accept error");
                            break;
                        }
                        warn!(error = %e, "Transient accept error");
                    },
                },
                _ = shutdown.recv() => {
                    info!("TCP listener shutting down");
                    break;
                },
            }
        }

        if let Some(reporter) = reporter {
            reporter.abort();
        }
        if let Some(udp_task) = udp_task {
            if let Err(e) = udp_task.await {
                error!(error = %e, "UDP relay task failed");
            }
        }
    }

    /// Run in the background and return a handle for shutdown.
    #[must_use]
    pub fn spawn(self) -> RelayHandle {
        let local_addr = self.listener.local_addr().unwrap_or_else(|_| self.config.tcp_listen_addr());
        let udp_local_addr = self.udp_local_addr();
        let metrics = self.metrics();
        let tracker = self.tracker();
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));

        RelayHandle {
            local_addr,
            udp_local_addr,
            metrics,
            tracker,
            shutdown,
            task,
        }
    }
}

impl RelayHandle {
    /// Bound TCP address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound UDP address, if enabled.
    #[must_use]
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp_local_addr
    }

    /// Shared metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Shared connection tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// Stop accepting and wait for the listeners to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Relay task failed");
        }
    }
}

/// Accept errors that leave the listener unusable.
fn is_fatal_accept_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::NotFound
    )
}
