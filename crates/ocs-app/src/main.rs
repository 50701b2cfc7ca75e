//! Option-chain streamer entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Streams index and option-chain quotes around the ATM strike.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via OCS_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is opened
    ocs_ws::init_crypto();

    let args = Args::parse();

    // CLI arg > OCS_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("OCS_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = ocs_app::AppConfig::from_file(&config_path)?;

    ocs_telemetry::init_logging(config.telemetry.log_filter.as_deref())?;
    info!("Starting ocstream v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        ws_url = %config.ws_url,
        chains = ?config.chain_symbols(),
        "Configuration loaded"
    );

    let app = ocs_app::Application::new(config)?;
    app.run().await?;

    Ok(())
}
