//! beamdrop - entry point
//!
//! Shares one directory over HTTP with a live usage feed.
//!
//! Usage: `beamdrop [SHARED_DIR]`. Everything else is configured through
//! `config.toml` or `BEAMDROP_*` environment variables.

use log::{error, info};

use beamdrop::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), beamdrop::error::ServerError> {
    let mut config = ServerConfig::load()?;
    if let Some(dir) = std::env::args().nth(1) {
        config = config.with_shared_dir(dir)?;
    }

    info!("Launching beamdrop...");
    let server = Server::new(config)?;
    let listener = server.bind().await?;
    server.run(listener).await
}
