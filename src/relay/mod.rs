//! # Transparent L4 Relay
//!
//! Forwards TCP connections and UDP datagrams between clients and a single
//! fixed target without interpreting the traffic.
//!
//! ## Features
//!
//! - **TCP relay**: every accepted client gets its own upstream connection,
//!   bytes are copied in both directions, and either side closing tears down
//!   both sockets
//! - **UDP relay**: every datagram is forwarded from a fresh upstream socket
//!   which waits for exactly one reply
//! - **Data inspection**: optional text/binary aware logging of payloads,
//!   either a short preview or a full dump with hex for binary data
//! - **Metrics**: connection counts, bytes transferred and throughput,
//!   reported periodically
//!
//! ## Example
//!
//! ```no_run
//! use l4_relay::config::RelayConfig;
//! use l4_relay::relay::RelayServer;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = RelayConfig::default();
//! config.target.host = "10.0.0.10".to_string();
//! config.target.port = 5432;
//!
//! let server = RelayServer::bind(config).await?;
//! let handle = server.spawn();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod inspect;
mod metrics;
mod server;
mod tcp;
mod tracker;
mod udp;

/// Read size per TCP direction and largest relayed UDP datagram.
pub const CHUNK_SIZE: usize = 4096;

pub use connection::{ConnectionInfo, ConnectionState, ConnectionSummary, Direction};
pub use error::{RelayError, RelayResult};
pub use inspect::{
    classify, hex_dump, inspect, is_text_byte, render, Inspection, LogOptions, Payload,
    PREVIEW_CHARS, SNIFF_LEN,
};
pub use metrics::{MetricsAggregator, MetricsReporter, MetricsSnapshot};
pub use server::{RelayHandle, RelayServer};
pub use tcp::TcpRelay;
pub use tracker::{ConnectionTracker, UdpSession, UdpSessionGuard};
pub use udp::{UdpRelay, DEFAULT_REPLY_TIMEOUT, MAX_DATAGRAM};
