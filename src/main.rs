use anyhow::Result;
use tracing::info;

use lingua_relay::config::RelayConfig;
use lingua_relay::relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lingua_relay=info".parse()?),
        )
        .init();

    info!("Starting chat relay");

    let config = RelayConfig::from_env()?;
    relay::serve(&config).await
}
