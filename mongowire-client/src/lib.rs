//! # mongowire-client
//!
//! Async client for servers speaking the legacy MongoDB wire protocol.
//!
//! This crate provides:
//! - Connections with request ID tracking and latched transport errors
//! - Replica-set discovery through isMaster
//! - Cursors over OP_QUERY / OP_GET_MORE / OP_KILL_CURSORS
//! - Database commands and write-result classification
//! - Per-member stream pools

pub mod client;
pub mod collection;
pub mod command;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod database;
pub mod document;
pub mod error;
pub mod options;
pub mod pool;
pub mod stream;
pub mod topology;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use collection::Collection;
pub use command::WriteOutcome;
pub use config::{ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionConfig, ConnectionHandle, ConnectionState};
pub use cursor::{Cursor, CursorState};
pub use database::Database;
pub use error::{ClientError, WriteConcernError, WriteError};
pub use options::{FindOptions, RemoveOptions, UpdateOptions};
pub use pool::StreamPool;
pub use stream::{BoxedStream, Dialer, TcpDialer, Transport};
pub use topology::{IsMasterReply, Member, Topology};

pub use bson;
