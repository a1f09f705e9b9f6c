//! Message header and raw framing.
//!
//! Every message starts with a 16-byte little-endian header:
//!
//! ```text
//! +---------------+------------+-------------+---------+
//! | messageLength | requestID  | responseTo  | opCode  |
//! |    4 bytes    |  4 bytes   |   4 bytes   | 4 bytes |
//! +---------------+------------+-------------+---------+
//! | operation-specific body                            |
//! +----------------------------------------------------+
//! ```
//!
//! `messageLength` counts the whole frame, header included.

use crate::buffer::read_i32_le;
use crate::error::ProtocolError;
use crate::MAX_MESSAGE_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the message header in bytes (4 * 4 = 16).
pub const HEADER_SIZE: usize = 16;

/// Operation codes.
///
/// `Update`, `Insert` and `Delete` are recognised when parsing but never sent;
/// writes travel as commands inside `Query` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl OpCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for OpCode {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(OpCode::Reply),
            2001 => Ok(OpCode::Update),
            2002 => Ok(OpCode::Insert),
            2004 => Ok(OpCode::Query),
            2005 => Ok(OpCode::GetMore),
            2006 => Ok(OpCode::Delete),
            2007 => Ok(OpCode::KillCursors),
            other => Err(ProtocolError::UnknownOpCode(other)),
        }
    }
}

/// Standard message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message size, including this header.
    pub message_length: i32,
    /// Identifier for this message.
    pub request_id: i32,
    /// Request ID this message answers (0 for requests).
    pub response_to: i32,
    /// Request type.
    pub op_code: OpCode,
}

impl MessageHeader {
    /// Decodes a header from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let message_length = read_i32_le(buf)?;
        let request_id = read_i32_le(buf)?;
        let response_to = read_i32_le(buf)?;
        let op_code = OpCode::try_from(read_i32_le(buf)?)?;
        Ok(Self {
            message_length,
            request_id,
            response_to,
            op_code,
        })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.message_length);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.response_to);
        buf.put_i32_le(self.op_code.as_i32());
    }
}

/// A complete message split into its header and undecoded body.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Frame {
    /// Splits one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` if more data is needed. Bytes are only consumed when a
    /// whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let declared = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if declared < HEADER_SIZE as i32 || declared as usize > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::InvalidMessageLength(declared));
        }

        let total_len = declared as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let mut frame = buf.split_to(total_len).freeze();
        let header = MessageHeader::decode(&mut frame)?;
        Ok(Some(Self {
            header,
            body: frame,
        }))
    }
}

/// Assembles a frame: header with a placeholder length, the body written by
/// `write_body`, then the real length patched into the first four bytes.
pub fn encode_message<F>(
    request_id: i32,
    response_to: i32,
    op_code: OpCode,
    write_body: F,
) -> Result<BytesMut, ProtocolError>
where
    F: FnOnce(&mut BytesMut) -> Result<(), ProtocolError>,
{
    let mut buf = BytesMut::with_capacity(64);
    MessageHeader {
        message_length: 0,
        request_id,
        response_to,
        op_code,
    }
    .encode(&mut buf);

    write_body(&mut buf)?;

    let size = buf.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    buf[0..4].copy_from_slice(&(size as i32).to_le_bytes());
    Ok(buf)
}
