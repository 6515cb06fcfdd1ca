//! Command-line surface.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// HTTP service for SORJ light controller configs and live port states.
///
/// Settings come from the config file, `/data/options.json` and the
/// environment (`SORJ_*`, `SUPERVISOR_TOKEN`, `SUPERVISOR_URL`,
/// `ESPHOME_CONFIG_DIR`); the flags below override them.
#[derive(Debug, Parser)]
#[command(name = "sorj-manager", version, about, long_about)]
pub struct Cli {
    /// Config file to load instead of the platform default
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8099
    #[arg(long, short = 'b', value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}
