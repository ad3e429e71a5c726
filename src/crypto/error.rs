use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    KeyMissing(String),
    DecryptFailed(String),
    EncryptionFailed(String),
    InvalidKeyLength { expected: usize, got: usize },
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeyMissing(peer) =>
                write!(f, "no symmetric key for peer '{}'", peer),
            CryptoError::DecryptFailed(reason) =>
                write!(f, "decryption failed: {}", reason),
            CryptoError::EncryptionFailed(reason) =>
                write!(f, "encryption failed: {}", reason),
            CryptoError::InvalidKeyLength { expected, got } =>
                write!(f, "invalid key length: expected {} bytes, got {}", expected, got),
        }
    }
}

impl std::error::Error for CryptoError {}
