//! Client error types.

use mongowire_protocol::ProtocolError;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The server applied a write but could not confirm the requested durability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConcernError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for WriteConcernError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write concern error {}: {}", self.code, self.message)
    }
}

/// One failed item of a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the failing item in the submitted batch.
    pub index: i32,
    pub code: i32,
    pub message: String,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}: error {}: {}", self.index, self.code, self.message)
    }
}

fn join_write_errors(errors: &[WriteError]) -> String {
    errors
        .iter()
        .map(WriteError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Client errors.
///
/// Cloneable so that a Connection can hand the same latched failure to every
/// caller that comes after it.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("connection closed mid-frame with {buffered} bytes buffered")]
    UnexpectedEof { buffered: usize },

    #[error("request timeout")]
    Timeout,

    #[error("connection abandoned while awaiting a reply")]
    Desynchronized,

    #[error("reply answers request {actual}, expected {expected}")]
    ResponseMismatch { expected: i32, actual: i32 },

    #[error("connection has been dropped")]
    ConnectionDropped,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("document encode error: {0}")]
    Encode(Arc<bson::ser::Error>),

    #[error("document decode error: {0}")]
    Decode(Arc<bson::de::Error>),

    #[error("cursor exhausted")]
    CursorExhausted,

    #[error("cursor {0} not found on server")]
    CursorNotFound(i64),

    #[error("query failed: {code} - {message}")]
    QueryFailure { code: i32, message: String },

    #[error("{0}")]
    WriteConcern(WriteConcernError),

    #[error("write errors: {}", join_write_errors(.0))]
    WriteErrors(Vec<WriteError>),

    #[error("command failed: {code} - {message}")]
    CommandFailed { code: i32, message: String },

    #[error("command returned no document")]
    EmptyReply,

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("no reachable members")]
    NoMembers,

    #[error("stream pool for {address} exhausted ({max} streams open)")]
    PoolExhausted { address: String, max: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// Returns whether this error is latched on the Connection that raised it.
    ///
    /// Fatal errors leave the stream in an unknown position; the Connection
    /// refuses further I/O until reconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::ConnectionClosed
                | ClientError::UnexpectedEof { .. }
                | ClientError::Timeout
                | ClientError::Desynchronized
                | ClientError::ResponseMismatch { .. }
                | ClientError::Protocol(_)
        )
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            return ClientError::Timeout;
        }
        ClientError::Io(Arc::new(err))
    }
}

impl From<bson::ser::Error> for ClientError {
    fn from(err: bson::ser::Error) -> Self {
        ClientError::Encode(Arc::new(err))
    }
}

impl From<bson::de::Error> for ClientError {
    fn from(err: bson::de::Error) -> Self {
        ClientError::Decode(Arc::new(err))
    }
}
