//! Protocol error types.

use crate::frame::OpCode;
use thiserror::Error;

/// Errors raised while framing or parsing wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("short read: needed {needed} bytes, {available} available")]
    ShortRead { needed: usize, available: usize },

    #[error("document length {0} is smaller than its own length prefix")]
    DocumentTooSmall(i32),

    #[error("invalid message length: {0}")]
    InvalidMessageLength(i32),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("unknown opcode: {0}")]
    UnknownOpCode(i32),

    #[error("unexpected opcode: expected {expected:?}, got {actual:?}")]
    UnexpectedOpCode { expected: OpCode, actual: OpCode },

    #[error("no NUL terminator within {max} bytes")]
    UnterminatedCString { max: usize },

    #[error("string contains an interior NUL byte")]
    InteriorNul,

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("negative document count: {0}")]
    NegativeDocumentCount(i32),

    #[error("{0} trailing bytes after the last document")]
    TrailingBytes(usize),

    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),
}
