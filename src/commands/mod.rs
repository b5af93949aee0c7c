//! CLI subcommands

pub mod download;
pub mod run;
pub mod snapshot;

use anyhow::Result;
use crypto_dashboard::Config;

/// Load the config file when given, stock defaults otherwise
pub fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}
