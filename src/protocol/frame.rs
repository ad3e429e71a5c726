use crate::protocol::error::FrameError;
use crate::protocol::{HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::utils::checksum::{checksum, verify_checksum};
use tracing::{error, trace, warn};

/// Fixed-size frame header (9 bytes, little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub code: u16,
    pub payload_len: u16,
    pub checksum: u32,
}

impl FrameHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < Self::SIZE {
            error!("Frame header too short: {} bytes", buf.len());
            return Err(FrameError::TooShort(buf.len()));
        }

        let header = Self {
            version: buf[0],
            code: u16::from_le_bytes([buf[1], buf[2]]),
            payload_len: u16::from_le_bytes([buf[3], buf[4]]),
            checksum: u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
        };

        if header.version != PROTOCOL_VERSION {
            warn!("Peer speaks protocol version {}, expected {}", header.version, PROTOCOL_VERSION);
        }

        Ok(header)
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.version;
        buf[1..3].copy_from_slice(&self.code.to_le_bytes());
        buf[3..5].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[5..9].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

/// One decoded frame borrowing its payload from the receive buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

impl Frame<'_> {
    pub fn code(&self) -> u16 {
        self.header.code
    }
}

/// Serialize `payload` under operation `code` into header ‖ payload.
pub fn encode(code: u16, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        error!("Payload of {} bytes exceeds frame limit", payload.len());
        return Err(FrameError::SizeOverflow(payload.len()));
    }

    let header = FrameHeader {
        version: PROTOCOL_VERSION,
        code,
        payload_len: payload.len() as u16,
        checksum: checksum(payload),
    };

    let mut out = Vec::with_capacity(FrameHeader::SIZE + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    trace!("Encoded frame code={} len={} checksum={:#x}", code, payload.len(), header.checksum);
    Ok(out)
}

/// Parse one frame from `bytes`, validating the declared length and checksum.
///
/// Bytes past the declared payload are ignored.
pub fn decode(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
    let header = FrameHeader::decode(bytes)?;

    let declared = header.payload_len as usize;
    let available = bytes.len() - FrameHeader::SIZE;
    if available < declared {
        error!("Truncated payload: declared={}, available={}", declared, available);
        return Err(FrameError::TruncatedPayload { declared, available });
    }

    let payload = &bytes[FrameHeader::SIZE..FrameHeader::SIZE + declared];
    if !verify_checksum(payload, header.checksum) {
        let computed = checksum(payload);
        error!("Checksum mismatch: expected={:x}, computed={:x}", header.checksum, computed);
        return Err(FrameError::ChecksumMismatch { expected: header.checksum, computed });
    }

    trace!("Decoded frame code={} len={}", header.code, declared);
    Ok(Frame { header, payload })
}
