//! Command Line Parsing
//!
//! A command line has the shape `<operation> <key> [<value>]`. The line is
//! split on the first space into operation and remainder, then the
//! remainder is split on the first space into key and value. Everything
//! after the second space belongs to the value, so values may contain
//! spaces; keys may not (there is no quoting support).
//!
//! The parser only validates shape. Whether the operation is one the
//! server knows is decided at dispatch time, so an unknown operation still
//! parses here and is answered with an error without closing the
//! connection.

use thiserror::Error;

/// Errors for command lines that don't have the required shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line was empty or started with a space
    #[error("invalid input: no operation was specified")]
    MissingOperation,

    /// The operation was not followed by a key
    #[error("invalid input: no key was specified")]
    MissingKey,
}

/// A single parsed command.
///
/// Constructed per received line and discarded after dispatch. The
/// operation is matched case-insensitively at dispatch time; the key is
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub operation: String,
    pub key: String,
    pub value: String,
}

/// Parses one command line into an [`Instruction`].
///
/// The value is the remainder of the line after the key, including any
/// embedded spaces; a missing value becomes the empty string.
pub fn parse_instruction(input: &str) -> Result<Instruction, ProtocolError> {
    let (operation, rest) = split_first_space(input);
    if operation.is_empty() {
        return Err(ProtocolError::MissingOperation);
    }

    let (key, value) = split_first_space(rest);
    if key.is_empty() {
        return Err(ProtocolError::MissingKey);
    }

    Ok(Instruction {
        operation: operation.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn split_first_space(input: &str) -> (&str, &str) {
    match input.split_once(' ') {
        Some((head, tail)) => (head, tail),
        None => (input, ""),
    }
}
