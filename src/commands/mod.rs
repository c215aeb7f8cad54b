//! Command Dispatch Module
//!
//! This module sits between the protocol codec and the store: it receives
//! parsed instructions, executes them against the [`Store`], and renders
//! the single-line text reply.
//!
//! ## Architecture
//!
//! ```text
//! Client line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Protocol Codec  │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Execute      │
//! │  - Render reply │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! [`Store`]: crate::storage::Store

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandHandler, OK};
