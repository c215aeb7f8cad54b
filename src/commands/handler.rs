//! Instruction Execution
//!
//! Maps a parsed [`Instruction`] onto the matching store call and renders
//! the reply line. Operation keywords are matched case-insensitively; an
//! operation the server doesn't know is answered with an error message,
//! never by closing the connection.

use crate::protocol::Instruction;
use crate::storage::Store;
use std::sync::Arc;
use tracing::debug;

/// Reply line for a successful SET or DEL.
pub const OK: &str = "OK";

/// Executes instructions against the shared store.
///
/// Cheap to clone: one handler is created per connection, all sharing the
/// same store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler over the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Executes one instruction and returns the reply line (without its
    /// terminator).
    ///
    /// Store errors — key not found, I/O failure during persist — are
    /// rendered into the reply rather than propagated; the connection
    /// stays usable either way.
    pub fn execute(&self, instruction: Instruction) -> String {
        debug!(
            operation = %instruction.operation,
            key = %instruction.key,
            "dispatching instruction"
        );

        match instruction.operation.to_ascii_uppercase().as_str() {
            "GET" => match self.store.get(&instruction.key) {
                Ok(value) => value,
                Err(e) => e.to_string(),
            },
            "SET" => match self.store.set(instruction.key, instruction.value) {
                Ok(()) => OK.to_string(),
                Err(e) => e.to_string(),
            },
            "DEL" => match self.store.delete(&instruction.key) {
                Ok(()) => OK.to_string(),
                Err(e) => e.to_string(),
            },
            _ => format!("unrecognized operation: {}", instruction.operation),
        }
    }
}
