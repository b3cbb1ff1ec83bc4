//! Command line arguments and their overrides on top of the loaded config.

use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::config::{LogLevel, RelayConfig};

const CONFIG_PARAM_NAME: &str = "config";
const LISTEN_PORT_PARAM_NAME: &str = "listen_port";
const TARGET_HOST_PARAM_NAME: &str = "target_host";
const TARGET_PORT_PARAM_NAME: &str = "target_port";
const LOG_FILE_PARAM_NAME: &str = "log_file";
const LOG_LEVEL_PARAM_NAME: &str = "log_level";
const LOG_DATA_PARAM_NAME: &str = "log_data";
const FULL_DEBUG_PARAM_NAME: &str = "full_debug";
const ENABLE_UDP_PARAM_NAME: &str = "enable_udp";

/// Argument definitions for the relay binary.
#[must_use]
pub fn command() -> Command {
    Command::new("l4-relay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Transparent TCP/UDP relay with logging capabilities")
        .args([
            Arg::new(CONFIG_PARAM_NAME)
                .short('c')
                .long("config")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to a TOML configuration file"),
            Arg::new(LISTEN_PORT_PARAM_NAME)
                .short('p')
                .long("listen-port")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(u16))
                .help("TCP listen port; UDP uses the next port"),
            Arg::new(TARGET_HOST_PARAM_NAME)
                .long("target-host")
                .action(ArgAction::Set)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Host all traffic is forwarded to"),
            Arg::new(TARGET_PORT_PARAM_NAME)
                .long("target-port")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(u16))
                .help("Port all traffic is forwarded to"),
            Arg::new(LOG_FILE_PARAM_NAME)
                .long("log-file")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to the log file"),
            Arg::new(LOG_LEVEL_PARAM_NAME)
                .long("log-level")
                .action(ArgAction::Set)
                .value_parser(str::parse::<LogLevel>)
                .help("Logging level: trace, debug, info, warning, error or critical"),
            Arg::new(LOG_DATA_PARAM_NAME)
                .long("log-data")
                .action(ArgAction::SetTrue)
                .help("Enable logging of data content"),
            Arg::new(FULL_DEBUG_PARAM_NAME)
                .long("full-debug")
                .action(ArgAction::SetTrue)
                .help("Enable full data logging (entire payload)"),
            Arg::new(ENABLE_UDP_PARAM_NAME)
                .long("enable-udp")
                .action(ArgAction::SetTrue)
                .help("Enable UDP relay alongside TCP"),
        ])
}

/// The `--config` path, if given.
#[must_use]
pub fn config_path(matches: &ArgMatches) -> Option<PathBuf> {
    matches.get_one::<PathBuf>(CONFIG_PARAM_NAME).cloned()
}

/// Overlay flags that were given on the command line onto `config`.
///
/// Boolean flags only ever switch features on.
pub fn apply_matches(matches: &ArgMatches, config: &mut RelayConfig) {
    if let Some(port) = matches.get_one::<u16>(LISTEN_PORT_PARAM_NAME) {
        config.listen.port = *port;
    }
    if let Some(host) = matches.get_one::<String>(TARGET_HOST_PARAM_NAME) {
        config.target.host.clone_from(host);
    }
    if let Some(port) = matches.get_one::<u16>(TARGET_PORT_PARAM_NAME) {
        config.target.port = *port;
    }
    if let Some(path) = matches.get_one::<PathBuf>(LOG_FILE_PARAM_NAME) {
        config.logging.file = Some(path.clone());
    }
    if let Some(level) = matches.get_one::<LogLevel>(LOG_LEVEL_PARAM_NAME) {
        config.logging.level = *level;
    }
    if matches.get_flag(LOG_DATA_PARAM_NAME) {
        config.logging.log_data = true;
    }
    if matches.get_flag(FULL_DEBUG_PARAM_NAME) {
        config.logging.full_dump = true;
    }
    if matches.get_flag(ENABLE_UDP_PARAM_NAME) {
        config.udp.enabled = true;
    }
}
