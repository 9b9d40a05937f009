use std::path::PathBuf;

use clap::Parser;

/// Runs the gateway demo binary against a `config.toml`.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about)]
pub struct Args {
    /// Path to the configuration file.
    #[arg(long, short = 'c', env = "GATEWAY_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Log filter, following `env_logger` syntax (e.g. `info` or `protocol=debug,gateway=info`).
    #[arg(long, env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}
