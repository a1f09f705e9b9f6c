//! # mongowire-protocol
//!
//! Legacy MongoDB wire protocol: OP_QUERY, OP_GET_MORE, OP_KILL_CURSORS
//! and OP_REPLY.
//!
//! This crate provides:
//! - Little-endian primitive and raw-document reads over byte buffers
//! - Message header framing
//! - Request encoders and the reply decoder
//! - A streaming frame decoder
//!
//! Documents are opaque length-prefixed buffers here; serializing them is the
//! caller's concern.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod flags;
pub mod frame;
pub mod message;
pub mod namespace;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use flags::{QueryFlags, ResponseFlags};
pub use frame::{encode_message, Frame, MessageHeader, OpCode, HEADER_SIZE};
pub use message::{GetMoreRequest, KillCursorsRequest, QueryRequest, Reply, RequestMessage};
pub use namespace::{Namespace, COMMAND_COLLECTION};

/// Default server port.
pub const DEFAULT_PORT: u16 = 27017;

/// Largest frame accepted or produced, header included.
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

/// Longest C string read from the wire, terminator included.
pub const MAX_CSTRING_SIZE: usize = 1024;
