//! TCP Server Module
//!
//! Owns the listening socket and the accept loop. Each accepted
//! connection gets its read deadline stamped and is handed to an
//! independent spawned task; the loop itself never does per-client work.
//!
//! ## Shutdown
//!
//! [`Server::bind`] returns a [`ServerHandle`] alongside the server. The
//! handle's `close` signals the accept loop through a watch channel: the
//! loop exits and the listening socket is dropped, while connections
//! already in flight keep running until they end on their own (QUIT,
//! deadline, or disconnect). An accept failure has the same blast radius:
//! it is fatal to new-connection acceptance only.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats, DeadlinePolicy};
use crate::storage::{Store, StoreError};
use crate::{DEFAULT_DATA_FILE, DEFAULT_HOST, DEFAULT_PORT};

/// Errors that are fatal to server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket bind failure
    #[error("bind error: {0}")]
    Io(#[from] std::io::Error),

    /// The store could not be opened (missing directory, corrupt
    /// snapshot, permission problem)
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path of the store's backing file
    pub data_path: PathBuf,

    /// Per-connection read deadline window (default: 60 seconds)
    pub read_timeout: Duration,

    /// Whether the deadline is renewed on activity
    pub deadline_policy: DeadlinePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_FILE),
            read_timeout: Duration::from_secs(60),
            deadline_policy: DeadlinePolicy::SessionCap,
        }
    }
}

/// The mapkv TCP server: listener, shared store, accept loop.
pub struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
    config: ServerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

/// Handle for stopping a running server's accept loop.
pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl ServerHandle {
    /// Stops the accept loop. Connections already in flight are not
    /// cancelled.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Server {
    /// Opens the store and binds the listening socket.
    ///
    /// Either failure is fatal: a server that cannot persist or cannot
    /// listen has nothing to offer.
    pub async fn bind(config: ServerConfig) -> Result<(Self, ServerHandle), ServerError> {
        let store = Arc::new(Store::open(&config.data_path)?);
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(addr = %listener.local_addr()?, "listening");

        Ok((
            Self {
                listener,
                store,
                stats: Arc::new(ConnectionStats::new()),
                config,
                shutdown_rx,
            },
            ServerHandle { shutdown_tx },
        ))
    }

    /// The bound address, useful when the configured port was 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared store, so the process entry point can close it after
    /// the server stops.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the accept loop until the handle is closed or accept fails.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                result = self.shutdown_rx.changed() => {
                    if result.is_err() || *self.shutdown_rx.borrow() {
                        info!("shutdown requested, accept loop stopping");
                        return;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let commands = CommandHandler::new(Arc::clone(&self.store));
                        let stats = Arc::clone(&self.stats);
                        let read_timeout = self.config.read_timeout;
                        let policy = self.config.deadline_policy;

                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            commands,
                            read_timeout,
                            policy,
                            stats,
                        ));
                    }
                    Err(e) => {
                        // Fatal to new connections only; running handlers
                        // are unaffected.
                        error!(error = %e, "failed to accept connection, accept loop stopping");
                        return;
                    }
                },
            }
        }
    }
}
