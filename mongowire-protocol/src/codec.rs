//! Streaming encoder and decoder for wire messages.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{Reply, RequestMessage};
use bytes::{Bytes, BytesMut};

/// Encodes messages into complete frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request under `request_id`.
    pub fn encode_request<M: RequestMessage>(
        message: &M,
        request_id: i32,
    ) -> Result<BytesMut, ProtocolError> {
        message.encode(request_id)
    }

    /// Encodes a reply. The reply's header supplies the request ID and
    /// `responseTo`.
    pub fn encode_reply(reply: &Reply) -> Result<BytesMut, ProtocolError> {
        reply.encode()
    }
}

/// Accumulates bytes read from a stream and splits off complete frames.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next OP_REPLY from the buffer.
    pub fn decode_reply(&mut self) -> Result<Option<Reply>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => Ok(Some(Reply::decode(frame)?)),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
