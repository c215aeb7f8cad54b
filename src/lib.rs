//! # mapkv - A Minimal Persistent Key-Value Store
//!
//! mapkv is a small key-value database written in Rust. It keeps the full
//! data set in an in-process map and mirrors that map to a single backing
//! file through a memory-mapped region, so the data survives restarts
//! without any log or compaction machinery.
//!
//! Clients talk to the server over a line-oriented text protocol on TCP:
//! one command per line, terminated by CR, LF, or CRLF.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               mapkv                                 │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │  ┌──────────────────────────────┐    ┌─────────────────────────┐    │
//! │  │       Protocol Codec         │    │          Store          │    │
//! │  │  (line framing + parsing)    │    │  ┌───────┐  ┌────────┐  │    │
//! │  └──────────────────────────────┘    │  │  Map  │─>│  mmap  │  │    │
//! │                                      │  └───────┘  └───┬────┘  │    │
//! │                                      └─────────────────┼───────┘    │
//! │                                                        ▼            │
//! │                                                  backing file       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Protocol
//!
//! - `GET key` - return the value stored at key
//! - `SET key value` - map key to value (the value may contain spaces)
//! - `DEL key` - remove key and its value
//! - `QUIT` - close the connection
//!
//! Each command is answered with a single line: the value for `GET`, `OK`
//! for `SET` and `DEL`, or an error message. Errors never close the
//! connection; only `QUIT`, the read deadline, or a transport failure do.
//!
//! ## Persistence Model
//!
//! The in-memory map is the single source of truth. Every mutation
//! re-serializes the whole map as one JSON document and writes it into the
//! mapped region, resizing file and region to the exact document length
//! first. This is an O(n)-per-write design, chosen for its simplicity at
//! the scale mapkv targets. Startup decodes the document back into the map.
//!
//! ## Module Overview
//!
//! - [`protocol`]: line framing and command parsing
//! - [`storage`]: the mmap-backed persistent store
//! - [`commands`]: dispatch of parsed instructions onto the store
//! - [`connection`]: per-client connection handling
//! - [`server`]: listener ownership and the accept loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats, DeadlinePolicy};
pub use protocol::{parse_instruction, Instruction, ProtocolError};
pub use server::{Server, ServerConfig, ServerHandle};
pub use storage::{Store, StoreError};

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 8888;

/// The default host the server binds to (all IPv4 interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// The default backing file, relative to the working directory
pub const DEFAULT_DATA_FILE: &str = "mapkv.db";

/// Version of mapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
