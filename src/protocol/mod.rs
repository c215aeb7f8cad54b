//! Line Protocol Implementation
//!
//! This module implements the codec for mapkv's text protocol: splitting a
//! byte stream into command lines and parsing a line into an instruction.
//!
//! ## Overview
//!
//! The protocol is line-oriented. A command is one line of text terminated
//! by CR, LF, or CRLF; the codec accepts all three so that netcat, telnet,
//! and real clients all work unmodified.
//!
//! ## Modules
//!
//! - `framing`: incremental splitting of a byte buffer into lines
//! - `parser`: turning one line into an [`Instruction`]
//!
//! ## Example
//!
//! ```
//! use mapkv::protocol::{framing, parse_instruction};
//!
//! let buf = b"SET greeting hello world\r\n";
//! let (line, consumed) = framing::split_line(buf).unwrap();
//! assert_eq!(consumed, buf.len());
//!
//! let instruction = parse_instruction(std::str::from_utf8(line).unwrap()).unwrap();
//! assert_eq!(instruction.operation, "SET");
//! assert_eq!(instruction.key, "greeting");
//! assert_eq!(instruction.value, "hello world");
//! ```

pub mod framing;
pub mod parser;

// Re-export commonly used types for convenience
pub use parser::{parse_instruction, Instruction, ProtocolError};
