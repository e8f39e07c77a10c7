use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pairforge::prelude::*;
use pairforge::{Config, StoreLocation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::parse();

    let log_level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pairforge={log_level},pairforge_instance={log_level},pairforge_session={log_level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let store = match config.store_location() {
        StoreLocation::Memory => {
            info!("Device store: memory");
            SessionStore::in_memory()
        }
        StoreLocation::Dir(dir) => {
            let store = SessionStore::open_dir(&dir).await?;
            let retained = store.stored_devices().await?.len();
            info!(dir = %dir.display(), retained, "Device store: files");
            store
        }
    };

    let loopback = config.loopback_config();
    if let Some(delay) = loopback.auto_pair_after {
        info!(?delay, "Loopback auto-pairing enabled");
    }

    let server = PairforgeServerBuilder::new()
        .bind(&config.bind_addr())
        .api_key(config.api_key.clone())
        .store(store)
        .instance_config(config.instance_config())
        .build(LoopbackProtocol::with_config(loopback))
        .await?;

    info!("Listening on {}", server.local_addr()?);
    server.run().await?;
    Ok(())
}
