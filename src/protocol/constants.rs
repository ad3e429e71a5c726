//! Protocol constants for relay network communication

/// Current protocol version, carried in the first header byte
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header: version(1) + code(2) + payload_len(2) + checksum(4)
pub const HEADER_SIZE: usize = 9;

/// Largest payload a u16 length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Field widths
pub const NAME_FIELD_SIZE: usize = 255;
pub const CLIENT_ID_SIZE: usize = 16;
/// Wide enough for a PEM-encoded RSA-4096 public key
pub const PUBLIC_KEY_SIZE: usize = 1024;

/// Prefix of every variable-length field
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Symmetric key material
pub const SYMMETRIC_KEY_SIZE: usize = 16;
pub const IV_SIZE: usize = 16;

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;
