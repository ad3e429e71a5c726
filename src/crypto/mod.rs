//! Cryptographic capabilities consumed by the key layer.
//!
//! The traits are the seams; `rsa_oaep`, `aes_cbc` and `random` hold the
//! production implementations.

pub mod aes_cbc;
pub mod error;
pub mod random;
pub mod rsa_oaep;

pub use aes_cbc::Aes128Cbc;
pub use error::CryptoError;
pub use random::OsRandom;
pub use rsa_oaep::RsaOaepCipher;

/// Public-key encryption. The implementation owns the local private key.
pub trait AsymmetricCipher: Send + Sync {
    fn encrypt(&self, public_key: &str, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

pub trait SymmetricCipher: Send + Sync {
    fn encrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

pub trait RandomSource: Send + Sync {
    fn bytes(&self, n: usize) -> Vec<u8>;
}
