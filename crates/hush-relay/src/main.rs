//! hush-relay binary entry point

use anyhow::Result;
use hush_relay::{RelayConfig, RelayServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::load()?;

    let server = RelayServer::new(config).await?;
    server.run().await?;

    Ok(())
}
