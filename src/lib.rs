//! # l4-relay
//!
//! A transparent Layer-4 relay: accepts TCP connections and UDP datagrams on
//! a listen address and forwards every byte to one fixed target, optionally
//! logging what passes through.
//!
//! ## Features
//!
//! - Bidirectional TCP relay, one upstream connection per client
//! - UDP relay on the TCP port + 1, one upstream socket per datagram
//! - Text/binary aware payload logging with preview and full-dump modes
//! - Connection and throughput metrics, logged periodically
//!
//! ## Layout
//!
//! - [`relay`] holds the forwarding engine and the listener wiring
//! - [`config`] loads and validates [`config::RelayConfig`]
//! - [`logging`] installs the `tracing` subscriber
//! - [`cli`] maps command line flags onto the configuration

pub mod cli;
pub mod config;
pub mod logging;
pub mod relay;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
