//! Primitive reads and writes over wire buffers.
//!
//! All integers on the wire are little-endian. Reads never consume a partial
//! field: if fewer bytes remain than a field needs, the buffer is left untouched
//! and `ProtocolError::ShortRead` is returned.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix at the start of every document.
pub const DOCUMENT_LENGTH_PREFIX: usize = 4;

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::ShortRead {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// Reads a little-endian 32-bit integer.
pub fn read_i32_le(buf: &mut impl Buf) -> Result<i32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32_le())
}

/// Reads a little-endian 64-bit integer.
pub fn read_i64_le(buf: &mut impl Buf) -> Result<i64, ProtocolError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64_le())
}

/// Reads bytes up to a NUL terminator and returns them as a string.
///
/// At most `max_size` bytes are examined, terminator included. The terminator is
/// consumed but not returned. On error nothing is consumed.
pub fn read_cstring(buf: &mut Bytes, max_size: usize) -> Result<String, ProtocolError> {
    let window = buf.len().min(max_size);
    let terminator = match buf[..window].iter().position(|&b| b == 0) {
        Some(pos) => pos,
        None if window == max_size => {
            return Err(ProtocolError::UnterminatedCString { max: max_size })
        }
        None => {
            return Err(ProtocolError::ShortRead {
                needed: window + 1,
                available: buf.len(),
            })
        }
    };

    let value = std::str::from_utf8(&buf[..terminator])
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .to_string();
    buf.advance(terminator + 1);
    Ok(value)
}

/// Reads one length-prefixed document without parsing it.
///
/// The returned buffer includes the 4-byte length prefix, so it can be handed
/// straight to a document decoder. A declared length of exactly 4 is a valid
/// empty document.
pub fn read_raw_document(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    ensure(buf, DOCUMENT_LENGTH_PREFIX)?;
    let declared = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if declared < DOCUMENT_LENGTH_PREFIX as i32 {
        return Err(ProtocolError::DocumentTooSmall(declared));
    }
    ensure(buf, declared as usize)?;
    Ok(buf.split_to(declared as usize))
}

/// Writes `value` followed by a single NUL byte.
pub fn put_cstring(buf: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    if value.as_bytes().contains(&0) {
        return Err(ProtocolError::InteriorNul);
    }
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
    Ok(())
}
