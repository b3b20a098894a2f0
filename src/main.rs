//! # dm-search
//!
//! Runs the search service: loads the TOML configuration, starts the
//! registrar loader and serves the search API.
//!
//! ```bash
//! dm-search --config ./config/dm-search.toml --host 0.0.0.0 --port 8000
//! ```

use clap::Parser;
use std::path::PathBuf;

use dm_search::{config, logging, server};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// Similarity search over data-product descriptions.
#[derive(Parser)]
#[command(name = "dm-search", version, about)]
struct Cli {
    /// Host for the server.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port for the server.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to configuration file (TOML).
    #[arg(long, alias = "configuration", default_value = "./config/dm-search.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_tracing(&cfg.logging);

    tracing::info!(config = %cli.config.display(), "configuration loaded");
    tracing::debug!(?cfg, "using configuration");

    let bind_addr = format!("{}:{}", cli.host, cli.port);
    server::run_server(&cfg, &bind_addr).await
}
