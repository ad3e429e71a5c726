//! Fixed-width and length-prefixed payload fields.
//!
//! A fixed field holds text in a zero-padded array of a declared width; text
//! longer than the width is truncated. A variable field is a u32 little-endian
//! length followed by exactly that many bytes.

use crate::protocol::error::ProtocolError;
use crate::protocol::LENGTH_PREFIX_SIZE;

/// Append `text` as a fixed field of `width` bytes.
pub fn put_fixed(out: &mut Vec<u8>, text: &str, width: usize) {
    let bytes = text.as_bytes();
    let take = bytes.len().min(width);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + (width - take), 0);
}

/// Pack `text` into a standalone fixed field of `width` bytes.
pub fn pack_fixed(text: &str, width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width);
    put_fixed(&mut out, text, width);
    out
}

/// Text of a fixed field, trimmed at the first zero byte.
pub fn unpack_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Append `data` as a length-prefixed variable field.
pub fn put_variable(out: &mut Vec<u8>, data: &[u8]) {
    out.reserve(LENGTH_PREFIX_SIZE + data.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

/// Bounds-checked cursor over a response payload
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::MalformedField { field, offset: self.pos });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, field)?[0])
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let b = self.take(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn fixed(&mut self, width: usize, field: &'static str) -> Result<String, ProtocolError> {
        self.take(width, field).map(unpack_fixed)
    }

    pub fn variable(&mut self, field: &'static str) -> Result<Vec<u8>, ProtocolError> {
        let start = self.pos;
        let len = self.u32(field)? as usize;
        match self.take(len, field) {
            Ok(data) => Ok(data.to_vec()),
            Err(_) => {
                // report the field start, not the position after its prefix
                self.pos = start;
                Err(ProtocolError::MalformedField { field, offset: start })
            }
        }
    }
}
