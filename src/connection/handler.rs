//! Per-Connection Read Loop
//!
//! The handler owns one client socket. It accumulates incoming bytes in a
//! `BytesMut` buffer, frames complete lines out of it, dispatches each
//! line, and writes the reply. Partial commands stay buffered until the
//! next read; several commands arriving in one read are all processed
//! before the socket is read again.
//!
//! ## Read Deadline
//!
//! A deadline is established when the connection is accepted. Under the
//! default [`DeadlinePolicy::SessionCap`] it is never renewed: the
//! connection is closed once the window elapses regardless of activity.
//! [`DeadlinePolicy::IdleTimeout`] instead renews the deadline after every
//! successful read, closing only connections that have gone quiet.

use crate::commands::CommandHandler;
use crate::protocol::{framing, parse_instruction};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Capability banner sent to every client on connect.
pub const BANNER: &str = "Commands:\n\
    \tGET key - return the value stored at key\n\
    \tSET key value - map key to value, the value may contain spaces\n\
    \tDEL key - remove key and its value\n\
    \tQUIT - close the connection";

/// Closing notice sent in reply to QUIT, before the socket is closed.
const CLOSING: &str = "Closing";

/// How the per-connection read deadline behaves once established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlinePolicy {
    /// One fixed window for the whole session, set at accept time and
    /// never renewed.
    #[default]
    SessionCap,

    /// Renewed after every successful read; closes only idle connections.
    IdleTimeout,
}

/// Statistics for connection handling, shared across all handlers.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total instructions dispatched
    pub commands_processed: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
///
/// These are transport-level conditions; command-level errors are written
/// back to the client as text and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client closed its end of the connection
    #[error("client disconnected")]
    ClientDisconnected,

    /// The read deadline elapsed
    #[error("read deadline expired")]
    DeadlineExpired,

    /// A single line exceeded the buffer cap
    #[error("buffer size limit exceeded")]
    BufferFull,
}

/// Whether the read loop continues after a line was processed.
enum LineOutcome {
    Continue,
    Close,
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The client socket, write-buffered
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Executes parsed instructions against the shared store
    commands: CommandHandler,

    /// The current read deadline
    deadline: Instant,

    /// Window used to (re-)arm the deadline
    read_timeout: Duration,

    /// Whether the deadline is renewed on activity
    policy: DeadlinePolicy,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new handler. The read deadline starts counting here,
    /// which is the moment the connection was accepted.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        read_timeout: Duration,
        policy: DeadlinePolicy,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            commands,
            deadline: Instant::now() + read_timeout,
            read_timeout,
            policy,
            stats,
        }
    }

    /// Runs the connection to completion.
    ///
    /// Returns `Ok(())` when the client sent QUIT; every other way the
    /// connection ends is an error variant, logged here at an appropriate
    /// level.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "client quit"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::DeadlineExpired) => {
                info!(client = %self.addr, "read deadline expired, closing connection")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The banner-then-read-frame-dispatch-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        self.send_line(BANNER).await?;

        loop {
            while let Some(line) = self.next_line() {
                if let LineOutcome::Close = self.process_line(&line).await? {
                    return Ok(());
                }
            }

            if !self.read_more_data().await? {
                // EOF. Any remaining bytes form a final, unterminated line.
                if !self.buffer.is_empty() {
                    let line = self.buffer.split_to(self.buffer.len()).freeze();
                    if let LineOutcome::Close = self.process_line(&line).await? {
                        return Ok(());
                    }
                }
                return Err(ConnectionError::ClientDisconnected);
            }
        }
    }

    /// Frames the next complete line out of the buffer, consuming it.
    fn next_line(&mut self) -> Option<Bytes> {
        let (line_len, consumed) = match framing::split_line(&self.buffer) {
            Some((line, consumed)) => (line.len(), consumed),
            None => return None,
        };

        let frame = self.buffer.split_to(consumed).freeze();
        trace!(
            client = %self.addr,
            consumed = consumed,
            remaining = self.buffer.len(),
            "framed line"
        );
        Some(frame.slice(..line_len))
    }

    /// Handles one framed line: empty lines are ignored, QUIT closes, and
    /// everything else is parsed and dispatched.
    async fn process_line(&mut self, line: &[u8]) -> Result<LineOutcome, ConnectionError> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();

        if text.is_empty() {
            return Ok(LineOutcome::Continue);
        }

        if text.eq_ignore_ascii_case("QUIT") {
            self.send_line(CLOSING).await?;
            return Ok(LineOutcome::Close);
        }

        let reply = match parse_instruction(text) {
            Ok(instruction) => {
                self.stats.command_processed();
                self.commands.execute(instruction)
            }
            Err(e) => e.to_string(),
        };

        self.send_line(&reply).await?;
        Ok(LineOutcome::Continue)
    }

    /// Reads more data from the socket into the buffer, bounded by the
    /// read deadline.
    ///
    /// Returns `Ok(false)` at EOF, `Ok(true)` when bytes arrived.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        let read = self.stream.get_mut().read_buf(&mut self.buffer);
        let n = match timeout_at(self.deadline, read).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::DeadlineExpired),
        };

        if n == 0 {
            return Ok(false);
        }

        if self.policy == DeadlinePolicy::IdleTimeout {
            self.deadline = Instant::now() + self.read_timeout;
        }

        trace!(client = %self.addr, bytes = n, "read data");
        Ok(true)
    }

    /// Writes `message` followed by a newline and flushes.
    async fn send_line(&mut self, message: &str) -> Result<(), ConnectionError> {
        self.stream.write_all(message.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Handles a client connection to completion, swallowing the expected
/// end-of-connection conditions.
///
/// This is the entry point the server spawns per accepted connection.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    read_timeout: Duration,
    policy: DeadlinePolicy,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, read_timeout, policy, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected | ConnectionError::DeadlineExpired => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "connection ended with error");
            }
        }
    }
}
