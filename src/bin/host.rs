//! flightsearch host binary.
//!
//! Usage: `flightsearch-host [CONFIG_PATH]`. Without a path the default
//! config file is used if present, otherwise built-in defaults.
//!
//! All tracing output goes to stderr.

use std::path::PathBuf;

use flightsearch::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    tracing::info!(
        addr = %config.server.bind_addr(),
        providers = config.providers.len(),
        "flightsearch-host starting"
    );

    flightsearch::runtime::run(config).await.map_err(|e| {
        tracing::error!(error = %e, "flightsearch-host exited with error");
        anyhow::anyhow!("flightsearch-host failed: {e}")
    })?;

    tracing::info!("flightsearch-host shut down cleanly");
    Ok(())
}
