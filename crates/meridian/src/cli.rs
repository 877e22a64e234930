//! Command-line interface handling for the Meridian scene server.
//!
//! Argument parsing is built on `clap`; every flag here overrides the
//! corresponding setting from the configuration file.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the scene limit
    pub max_scenes: Option<usize>,
    /// Whether to skip spawning the demo scenes
    pub no_demo: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    pub fn parse() -> Self {
        let matches = Command::new("Meridian Scene Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Scene simulation server with actor-based concurrency")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("meridian.toml"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("max-scenes")
                    .long("max-scenes")
                    .value_name("COUNT")
                    .help("Maximum number of concurrent scenes")
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                Arg::new("no-demo")
                    .long("no-demo")
                    .help("Do not spawn the demo scenes at startup")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .map(String::as_str)
                    .unwrap_or("meridian.toml"),
            ),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            max_scenes: matches.get_one::<usize>("max-scenes").copied(),
            no_demo: matches.get_flag("no-demo"),
        }
    }
}
