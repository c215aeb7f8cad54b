//! mapkv - A Minimal Persistent Key-Value Store
//!
//! This is the main entry point for the mapkv server. It parses the
//! optional port argument, opens the store, binds the listener, and runs
//! the accept loop until a shutdown signal arrives.

use mapkv::server::{Server, ServerConfig};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Process configuration.
struct Config {
    /// Port to listen on
    port: u16,
}

impl Config {
    /// Parses the single optional positional argument: the port.
    fn from_args() -> anyhow::Result<Self> {
        let port = match std::env::args().nth(1) {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("{} is not a valid port number", raw))?,
            None => mapkv::DEFAULT_PORT,
        };

        Ok(Self { port })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    // Set up logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let server_config = ServerConfig {
        port: config.port,
        ..ServerConfig::default()
    };

    let (server, handle) = Server::bind(server_config).await?;
    let store = server.store();
    info!(port = config.port, version = mapkv::VERSION, "mapkv started");

    // Run until the accept loop ends on its own or a signal arrives.
    tokio::select! {
        _ = server.run() => {}
        _ = signal::ctrl_c() => {
            info!("shutdown signal received, stopping server");
            handle.close();
        }
    }

    if let Err(e) = store.close() {
        warn!(error = %e, "failed to close store cleanly");
    }

    info!("server shutdown complete");
    Ok(())
}
