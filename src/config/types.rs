//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure for the relay.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Where the relay accepts traffic.
    pub listen: ListenConfig,

    /// The single upstream all traffic is forwarded to.
    pub target: TargetConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// TCP relay tuning.
    pub tcp: TcpConfig,

    /// UDP relay configuration.
    pub udp: UdpConfig,

    /// Periodic metrics reporting.
    pub metrics: MetricsConfig,
}

impl RelayConfig {
    /// TCP listen address.
    #[must_use]
    pub fn tcp_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen.host, self.listen.port)
    }

    /// UDP listen address, always the TCP port + 1.
    ///
    /// Returns `None` when the TCP port is the last port in range.
    #[must_use]
    pub fn udp_listen_addr(&self) -> Option<SocketAddr> {
        self.listen
            .port
            .checked_add(1)
            .map(|port| SocketAddr::new(self.listen.host, port))
    }
}

/// Listen section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenConfig {
    /// Bind address.
    pub host: IpAddr,

    /// TCP port. UDP listens on `port + 1`.
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

/// Target section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    /// Target host name or address.
    pub host: String,

    /// Target port.
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
        }
    }
}

impl std::fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity.
    pub level: LogLevel,

    /// Output format.
    pub format: LogFormat,

    /// Optional log file. Output still goes to stdout when set.
    pub file: Option<PathBuf>,

    /// Log payload content of relayed traffic.
    pub log_data: bool,

    /// Log entire payloads instead of a bounded preview.
    pub full_dump: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    #[serde(alias = "warning")]
    Warn,
    /// Error level (least verbose).
    #[serde(alias = "critical")]
    Error,
}

impl LogLevel {
    /// The matching `tracing` level.
    #[must_use]
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Multi-line human-readable format.
    Pretty,
    /// Single-line format (default).
    #[default]
    Compact,
}

/// TCP relay tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TcpConfig {
    /// Upstream connect timeout. `None` waits for the OS.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,

    /// Per-direction idle timeout. `None` keeps stalled peers open forever.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,

    /// Read chunk size per direction.
    pub buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            idle_timeout: None,
            buffer_size: crate::relay::CHUNK_SIZE,
        }
    }
}

/// UDP relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UdpConfig {
    /// Run the UDP relay alongside TCP.
    pub enabled: bool,

    /// How long a session waits for the single upstream reply.
    #[serde(with = "humantime_serde")]
    pub reply_timeout: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reply_timeout: Duration::from_secs(5),
        }
    }
}

/// Metrics reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Emit periodic snapshots.
    pub enabled: bool,

    /// Reporting interval.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}
