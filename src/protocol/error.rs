use std::fmt;

/// Failures of the frame layer (header + payload framing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    TooShort(usize),
    TruncatedPayload { declared: usize, available: usize },
    SizeOverflow(usize),
    ChecksumMismatch { expected: u32, computed: u32 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort(len) =>
                write!(f, "frame too short: {} bytes", len),
            FrameError::TruncatedPayload { declared, available } =>
                write!(f, "truncated payload: header declares {} bytes, {} available", declared, available),
            FrameError::SizeOverflow(size) =>
                write!(f, "payload too large: {} bytes", size),
            FrameError::ChecksumMismatch { expected, computed } =>
                write!(f, "checksum mismatch: expected={:#010x}, computed={:#010x}", expected, computed),
        }
    }
}

impl std::error::Error for FrameError {}

/// Failures of the message catalog (payload layouts)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    UnexpectedOperationCode(u16),
    MalformedField { field: &'static str, offset: usize },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedOperationCode(code) =>
                write!(f, "unexpected operation code {}", code),
            ProtocolError::MalformedField { field, offset } =>
                write!(f, "malformed field '{}' at offset {}", field, offset),
        }
    }
}

impl std::error::Error for ProtocolError {}
