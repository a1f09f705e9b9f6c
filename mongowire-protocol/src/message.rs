//! Wire message types.
//!
//! Requests are encoded with [`RequestMessage::encode`]; replies are parsed
//! from a [`Frame`]. Documents are carried as raw length-prefixed byte buffers
//! and never interpreted here.

use crate::buffer::{put_cstring, read_cstring, read_i32_le, read_i64_le, read_raw_document};
use crate::error::ProtocolError;
use crate::flags::{QueryFlags, ResponseFlags};
use crate::frame::{encode_message, Frame, MessageHeader, OpCode, HEADER_SIZE};
use crate::namespace::Namespace;
use crate::MAX_CSTRING_SIZE;
use bytes::{BufMut, Bytes, BytesMut};

/// A message a client sends to the server.
pub trait RequestMessage {
    const OP_CODE: OpCode;

    /// Whether the server answers this message with an OP_REPLY.
    const EXPECTS_REPLY: bool = true;

    /// Encodes the complete frame, header included.
    fn encode(&self, request_id: i32) -> Result<BytesMut, ProtocolError>;
}

fn expect_op_code(frame: &Frame, expected: OpCode) -> Result<(), ProtocolError> {
    if frame.header.op_code != expected {
        return Err(ProtocolError::UnexpectedOpCode {
            expected,
            actual: frame.header.op_code,
        });
    }
    Ok(())
}

fn expect_consumed(body: &Bytes) -> Result<(), ProtocolError> {
    if !body.is_empty() {
        return Err(ProtocolError::TrailingBytes(body.len()));
    }
    Ok(())
}

/// OP_QUERY.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Bit vector of query options.
    pub flags: QueryFlags,
    /// "dbname.collectionname"
    pub full_collection_name: String,
    /// Number of documents to skip.
    pub number_to_skip: i32,
    /// Number of documents in the first batch. Negative means "at most |n|,
    /// then close the cursor".
    pub number_to_return: i32,
    /// Query document.
    pub query: Bytes,
    /// Optional selector of the fields to return.
    pub return_fields_selector: Option<Bytes>,
}

impl QueryRequest {
    pub fn new(full_collection_name: impl Into<String>, query: Bytes) -> Self {
        Self {
            flags: QueryFlags::new(),
            full_collection_name: full_collection_name.into(),
            number_to_skip: 0,
            number_to_return: 0,
            query,
            return_fields_selector: None,
        }
    }

    /// A single-document command against `<database>.$cmd`.
    pub fn command(database: &str, command: Bytes) -> Self {
        Self::new(Namespace::command(database).to_string(), command).with_number_to_return(-1)
    }

    pub fn with_flags(mut self, flags: QueryFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_number_to_skip(mut self, skip: i32) -> Self {
        self.number_to_skip = skip;
        self
    }

    pub fn with_number_to_return(mut self, count: i32) -> Self {
        self.number_to_return = count;
        self
    }

    pub fn with_return_fields_selector(mut self, selector: Option<Bytes>) -> Self {
        self.return_fields_selector = selector;
        self
    }

    pub fn decode(frame: Frame) -> Result<Self, ProtocolError> {
        expect_op_code(&frame, OpCode::Query)?;
        let mut body = frame.body;
        let flags = QueryFlags::from_bits(read_i32_le(&mut body)?);
        let full_collection_name = read_cstring(&mut body, MAX_CSTRING_SIZE)?;
        let number_to_skip = read_i32_le(&mut body)?;
        let number_to_return = read_i32_le(&mut body)?;
        let query = read_raw_document(&mut body)?;
        let return_fields_selector = if body.is_empty() {
            None
        } else {
            Some(read_raw_document(&mut body)?)
        };
        expect_consumed(&body)?;
        Ok(Self {
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }
}

impl RequestMessage for QueryRequest {
    const OP_CODE: OpCode = OpCode::Query;

    fn encode(&self, request_id: i32) -> Result<BytesMut, ProtocolError> {
        encode_message(request_id, 0, Self::OP_CODE, |buf| {
            buf.put_i32_le(self.flags.bits());
            put_cstring(buf, &self.full_collection_name)?;
            buf.put_i32_le(self.number_to_skip);
            buf.put_i32_le(self.number_to_return);
            buf.put_slice(&self.query);
            if let Some(ref selector) = self.return_fields_selector {
                buf.put_slice(selector);
            }
            Ok(())
        })
    }
}

/// OP_GET_MORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMoreRequest {
    /// "dbname.collectionname"
    pub full_collection_name: String,
    /// Number of documents to return.
    pub number_to_return: i32,
    /// Cursor ID from the previous OP_REPLY.
    pub cursor_id: i64,
}

impl GetMoreRequest {
    pub fn new(full_collection_name: impl Into<String>, number_to_return: i32, cursor_id: i64) -> Self {
        Self {
            full_collection_name: full_collection_name.into(),
            number_to_return,
            cursor_id,
        }
    }

    pub fn decode(frame: Frame) -> Result<Self, ProtocolError> {
        expect_op_code(&frame, OpCode::GetMore)?;
        let mut body = frame.body;
        let _reserved = read_i32_le(&mut body)?;
        let full_collection_name = read_cstring(&mut body, MAX_CSTRING_SIZE)?;
        let number_to_return = read_i32_le(&mut body)?;
        let cursor_id = read_i64_le(&mut body)?;
        expect_consumed(&body)?;
        Ok(Self {
            full_collection_name,
            number_to_return,
            cursor_id,
        })
    }
}

impl RequestMessage for GetMoreRequest {
    const OP_CODE: OpCode = OpCode::GetMore;

    fn encode(&self, request_id: i32) -> Result<BytesMut, ProtocolError> {
        encode_message(request_id, 0, Self::OP_CODE, |buf| {
            // reserved
            buf.put_i32_le(0);
            put_cstring(buf, &self.full_collection_name)?;
            buf.put_i32_le(self.number_to_return);
            buf.put_i64_le(self.cursor_id);
            Ok(())
        })
    }
}

/// OP_KILL_CURSORS. The server sends no reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillCursorsRequest {
    pub cursor_ids: Vec<i64>,
}

impl KillCursorsRequest {
    pub fn new(cursor_ids: Vec<i64>) -> Self {
        Self { cursor_ids }
    }

    pub fn decode(frame: Frame) -> Result<Self, ProtocolError> {
        expect_op_code(&frame, OpCode::KillCursors)?;
        let mut body = frame.body;
        let _reserved = read_i32_le(&mut body)?;
        let count = read_i32_le(&mut body)?;
        if count < 0 {
            return Err(ProtocolError::NegativeDocumentCount(count));
        }
        let mut cursor_ids = Vec::with_capacity((count as usize).min(body.len() / 8));
        for _ in 0..count {
            cursor_ids.push(read_i64_le(&mut body)?);
        }
        expect_consumed(&body)?;
        Ok(Self { cursor_ids })
    }
}

impl RequestMessage for KillCursorsRequest {
    const OP_CODE: OpCode = OpCode::KillCursors;
    const EXPECTS_REPLY: bool = false;

    fn encode(&self, request_id: i32) -> Result<BytesMut, ProtocolError> {
        encode_message(request_id, 0, Self::OP_CODE, |buf| {
            // reserved
            buf.put_i32_le(0);
            buf.put_i32_le(self.cursor_ids.len() as i32);
            for id in &self.cursor_ids {
                buf.put_i64_le(*id);
            }
            Ok(())
        })
    }
}

/// OP_REPLY.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub header: MessageHeader,
    pub response_flags: ResponseFlags,
    /// Cursor to pass to GET_MORE, or 0 when the result set is exhausted.
    pub cursor_id: i64,
    /// Position in the cursor where this batch starts.
    pub starting_from: i32,
    pub number_returned: i32,
    /// Raw documents, each with its own length prefix.
    pub documents: Vec<Bytes>,
}

impl Reply {
    /// Fixed part of the body: flags, cursor ID, startingFrom, numberReturned.
    pub const FIXED_BODY_SIZE: usize = 4 + 8 + 4 + 4;

    /// Builds a reply to `response_to` carrying `documents`.
    pub fn new(response_to: i32, cursor_id: i64, documents: Vec<Bytes>) -> Self {
        Self {
            header: MessageHeader {
                message_length: 0,
                request_id: 0,
                response_to,
                op_code: OpCode::Reply,
            },
            response_flags: ResponseFlags::new(),
            cursor_id,
            starting_from: 0,
            number_returned: documents.len() as i32,
            documents,
        }
    }

    pub fn with_flags(mut self, flags: ResponseFlags) -> Self {
        self.response_flags = flags;
        self
    }

    pub fn with_starting_from(mut self, starting_from: i32) -> Self {
        self.starting_from = starting_from;
        self
    }

    pub fn decode(frame: Frame) -> Result<Self, ProtocolError> {
        expect_op_code(&frame, OpCode::Reply)?;
        let header = frame.header;
        let mut body = frame.body;
        let response_flags = ResponseFlags::from_bits(read_i32_le(&mut body)?);
        let cursor_id = read_i64_le(&mut body)?;
        let starting_from = read_i32_le(&mut body)?;
        let number_returned = read_i32_le(&mut body)?;
        if number_returned < 0 {
            return Err(ProtocolError::NegativeDocumentCount(number_returned));
        }

        // Every document is at least 5 bytes; don't trust the count for capacity.
        let mut documents = Vec::with_capacity((number_returned as usize).min(body.len() / 5));
        for _ in 0..number_returned {
            documents.push(read_raw_document(&mut body)?);
        }
        expect_consumed(&body)?;

        Ok(Self {
            header,
            response_flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }

    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_message(
            self.header.request_id,
            self.header.response_to,
            OpCode::Reply,
            |buf| {
                buf.reserve(
                    Self::FIXED_BODY_SIZE + self.documents.iter().map(Bytes::len).sum::<usize>(),
                );
                buf.put_i32_le(self.response_flags.bits());
                buf.put_i64_le(self.cursor_id);
                buf.put_i32_le(self.starting_from);
                buf.put_i32_le(self.documents.len() as i32);
                for document in &self.documents {
                    buf.put_slice(document);
                }
                Ok(())
            },
        )
    }

    /// Total encoded size of this reply.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + Self::FIXED_BODY_SIZE + self.documents.iter().map(Bytes::len).sum::<usize>()
    }
}
