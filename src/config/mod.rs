//! # Configuration System
//!
//! TOML-based configuration for the relay, with environment overrides and
//! validation.
//!
//! Values are layered: built-in defaults, then the TOML file, then the
//! environment (`PROXY_PORT`, `TARGET_HOST`, `TARGET_PORT`,
//! `PROXY_LOG_LEVEL`), where a `.env` file fills in variables the process
//! does not set. Command-line flags are applied last by the binary.
//!
//! ## Example Configuration
//!
//! ```toml
//! [listen]
//! host = "0.0.0.0"
//! port = 8080          # UDP, when enabled, listens on 8081
//!
//! [target]
//! host = "localhost"
//! port = 80
//!
//! [logging]
//! level = "info"
//! log_data = false
//! full_dump = false
//!
//! [tcp]
//! connect_timeout = "10s"
//! # idle_timeout = "5m"
//!
//! [udp]
//! enabled = true
//! reply_timeout = "5s"
//!
//! [metrics]
//! interval = "60s"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    apply_env, apply_env_file, apply_env_file_with, apply_env_with, ConfigLoader,
    DEFAULT_ENV_FILE, ENV_LOG_LEVEL, ENV_PROXY_PORT, ENV_TARGET_HOST, ENV_TARGET_PORT,
};
pub use types::{
    ListenConfig, LogFormat, LogLevel, LoggingConfig, MetricsConfig, RelayConfig, TargetConfig,
    TcpConfig, UdpConfig,
};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
