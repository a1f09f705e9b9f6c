//! Connection management.
//!
//! A [`Connection`] owns one transport and runs a strict request/reply cycle:
//! one request is written, then exactly one reply is read before the next
//! request may start. The first fatal error is latched and replayed to every
//! later caller without touching the stream.

use crate::error::ClientError;
use crate::stream::{BoxedStream, Dialer};
use mongowire_protocol::message::{GetMoreRequest, KillCursorsRequest, QueryRequest};
use mongowire_protocol::{Decoder, Encoder, Reply, RequestMessage};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// A Connection shared between a Topology and the handles built on it.
pub type ConnectionHandle = Arc<tokio::sync::Mutex<Connection>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Longest wait for a request to be written and its reply read.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a Connection is in its request/reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready for the next request.
    Idle,
    /// A request is being written.
    Writing,
    /// A request was written and its reply has not been read yet.
    AwaitingReply { request_id: i32 },
}

/// A connection to one server.
pub struct Connection {
    address: String,
    config: ConnectionConfig,
    stream: Option<BoxedStream>,
    decoder: Decoder,
    request_id: i32,
    state: ConnectionState,
    latched: Option<ClientError>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("connected", &self.stream.is_some())
            .field("request_id", &self.request_id)
            .field("state", &self.state)
            .field("latched", &self.latched)
            .finish()
    }
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(address: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            address: address.into(),
            decoder: Decoder::with_capacity(config.read_buffer_size),
            config,
            stream: None,
            request_id: 0,
            state: ConnectionState::Idle,
            latched: None,
        }
    }

    /// Creates a connection over an already open stream.
    pub fn from_stream(
        address: impl Into<String>,
        stream: BoxedStream,
        config: ConnectionConfig,
    ) -> Self {
        let mut conn = Self::new(address, config);
        conn.stream = Some(stream);
        conn
    }

    /// Wraps this connection in a shareable handle.
    pub fn into_handle(self) -> ConnectionHandle {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Opens a fresh stream to this connection's address.
    ///
    /// Any previous stream is shut down first. A latched error is cleared on
    /// success; a dial failure is latched.
    pub async fn connect(&mut self, dialer: &dyn Dialer) -> Result<(), ClientError> {
        self.shutdown_stream().await;
        tracing::debug!("Connecting to {}...", self.address);

        let stream = match dialer.dial(&self.address).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("Connection to {} failed: {}", self.address, e);
                return Err(self.latch(e.into()));
            }
        };

        self.install(stream);
        tracing::debug!("Connected to {}", self.address);
        Ok(())
    }

    /// Swaps in a stream obtained elsewhere, dropping the old one unused.
    pub async fn replace_stream(&mut self, stream: BoxedStream) {
        self.shutdown_stream().await;
        self.install(stream);
    }

    fn install(&mut self, stream: BoxedStream) {
        self.stream = Some(stream);
        self.decoder.clear();
        self.state = ConnectionState::Idle;
        self.latched = None;
    }

    async fn shutdown_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Shutting down stream to {}", self.address);
            let _ = stream.shutdown().await;
        }
    }

    /// Returns the next request ID. Wraps on overflow.
    pub fn next_request_id(&mut self) -> i32 {
        self.request_id = self.request_id.wrapping_add(1);
        self.request_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The latched fatal error, if any.
    pub fn latched_error(&self) -> Option<&ClientError> {
        self.latched.as_ref()
    }

    /// Returns whether the connection has a stream and no latched error.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && self.latched.is_none()
    }

    /// Records `err` if it is fatal, dropping the stream. Returns `err`.
    fn latch(&mut self, err: ClientError) -> ClientError {
        if err.is_fatal() && self.latched.is_none() {
            tracing::debug!("Latching error on {}: {}", self.address, err);
            self.latched = Some(err.clone());
            self.stream = None;
            self.decoder.clear();
        }
        err
    }

    fn ensure_usable(&mut self) -> Result<(), ClientError> {
        if let Some(ref err) = self.latched {
            return Err(err.clone());
        }
        if self.state != ConnectionState::Idle {
            return Err(self.latch(ClientError::Desynchronized));
        }
        if self.stream.is_none() {
            return Err(self.latch(ClientError::ConnectionClosed));
        }
        Ok(())
    }

    /// Encodes and writes one request.
    ///
    /// Returns the request ID it was sent under. Encoding errors are returned
    /// without touching the stream; write errors are latched.
    pub async fn send<M: RequestMessage>(&mut self, message: &M) -> Result<i32, ClientError> {
        self.ensure_usable()?;

        let request_id = self.next_request_id();
        let encoded = Encoder::encode_request(message, request_id)?;
        tracing::debug!(
            "Sending request id={} op={:?} ({} bytes) to {}",
            request_id,
            M::OP_CODE,
            encoded.len(),
            self.address
        );

        self.state = ConnectionState::Writing;
        let timeout = self.config.request_timeout;
        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let written = tokio::time::timeout(timeout, async {
            stream.write_all(&encoded).await?;
            stream.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.latch(e.into())),
            Err(_) => return Err(self.latch(ClientError::Timeout)),
        }

        self.state = if M::EXPECTS_REPLY {
            ConnectionState::AwaitingReply { request_id }
        } else {
            ConnectionState::Idle
        };
        Ok(request_id)
    }

    /// Reads the reply to the request sent last.
    pub async fn receive(&mut self) -> Result<Reply, ClientError> {
        if let Some(ref err) = self.latched {
            return Err(err.clone());
        }
        let request_id = match self.state {
            ConnectionState::AwaitingReply { request_id } => request_id,
            ConnectionState::Writing => return Err(self.latch(ClientError::Desynchronized)),
            ConnectionState::Idle => {
                return Err(ClientError::InvalidArgument(
                    "no request is awaiting a reply".to_string(),
                ))
            }
        };

        let reply = match self.read_reply().await {
            Ok(reply) => reply,
            Err(e) => return Err(self.latch(e)),
        };

        if reply.header.response_to != request_id {
            return Err(self.latch(ClientError::ResponseMismatch {
                expected: request_id,
                actual: reply.header.response_to,
            }));
        }

        tracing::debug!(
            "Reply to id={}: cursor={} documents={}",
            request_id,
            reply.cursor_id,
            reply.number_returned
        );
        self.state = ConnectionState::Idle;
        Ok(reply)
    }

    /// Sends a request and waits for its reply.
    pub async fn send_with_response<M: RequestMessage>(
        &mut self,
        message: &M,
    ) -> Result<Reply, ClientError> {
        self.send(message).await?;
        self.receive().await
    }

    /// Reads until one complete reply is decoded, the stream ends, or the
    /// request timeout elapses.
    async fn read_reply(&mut self) -> Result<Reply, ClientError> {
        let timeout = self.config.request_timeout;
        let buffer_size = self.config.read_buffer_size;
        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let decoder = &mut self.decoder;

        tokio::time::timeout(timeout, async {
            let mut buf = vec![0u8; buffer_size];
            loop {
                if let Some(reply) = decoder.decode_reply()? {
                    return Ok::<Reply, ClientError>(reply);
                }

                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    let buffered = decoder.buffered();
                    tracing::debug!("Stream closed with {} bytes buffered", buffered);
                    return Err(if buffered == 0 {
                        ClientError::ConnectionClosed
                    } else {
                        ClientError::UnexpectedEof { buffered }
                    });
                }
                decoder.extend(&buf[..n]);
            }
        })
        .await
        .map_err(|_| {
            tracing::debug!("Read timeout");
            ClientError::Timeout
        })?
    }

    /// Runs an OP_QUERY and returns its first batch.
    ///
    /// A reply flagged as a query failure becomes `QueryFailure`.
    pub async fn query(&mut self, request: &QueryRequest) -> Result<Reply, ClientError> {
        let reply = self.send_with_response(request).await?;
        if reply.response_flags.is_query_failure() {
            return Err(query_failure(&reply));
        }
        Ok(reply)
    }

    /// Fetches the next batch of `cursor_id`.
    pub async fn get_more(
        &mut self,
        full_collection_name: &str,
        number_to_return: i32,
        cursor_id: i64,
    ) -> Result<Reply, ClientError> {
        let request = GetMoreRequest::new(full_collection_name, number_to_return, cursor_id);
        let reply = self.send_with_response(&request).await?;
        if reply.response_flags.is_cursor_not_found() {
            return Err(ClientError::CursorNotFound(cursor_id));
        }
        if reply.response_flags.is_query_failure() {
            return Err(query_failure(&reply));
        }
        Ok(reply)
    }

    /// Tells the server to release `cursor_ids`. The server does not reply.
    pub async fn kill_cursors(&mut self, cursor_ids: &[i64]) -> Result<(), ClientError> {
        if cursor_ids.is_empty() {
            return Ok(());
        }
        self.send(&KillCursorsRequest::new(cursor_ids.to_vec()))
            .await
            .map(|_| ())
    }

    /// Shuts the stream down. The connection can be reopened with `connect`.
    pub async fn close(&mut self) {
        tracing::debug!("Closing connection to {}", self.address);
        self.shutdown_stream().await;
        self.decoder.clear();
        self.state = ConnectionState::Idle;
    }
}

fn query_failure(reply: &Reply) -> ClientError {
    let document = reply
        .documents
        .first()
        .and_then(|raw| crate::document::decode_document(raw).ok());
    match document {
        Some(doc) => ClientError::QueryFailure {
            code: crate::document::lenient_i64(&doc, "code").unwrap_or(0) as i32,
            message: doc.get_str("$err").unwrap_or("query failure").to_string(),
        },
        None => ClientError::QueryFailure {
            code: 0,
            message: "query failure".to_string(),
        },
    }
}
