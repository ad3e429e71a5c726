use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::{debug, info};

use crate::crypto::{AsymmetricCipher, CryptoError};

pub const DEFAULT_KEY_BITS: usize = 2048;
/// Largest modulus whose PEM public key fits the registration field
pub const MAX_KEY_BITS: usize = 4096;

/// RSA with OAEP(SHA-256) padding. Public keys travel as PKCS#1 PEM text.
pub struct RsaOaepCipher {
    private_key: RsaPrivateKey,
}

impl RsaOaepCipher {
    pub fn generate(bits: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(bits <= MAX_KEY_BITS, "{}-bit keys exceed the {}-bit maximum", bits, MAX_KEY_BITS);
        info!("Generating {}-bit RSA key pair", bits);
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
        Ok(Self { private_key })
    }

    pub fn from_private_pem(pem: &str) -> anyhow::Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)?;
        Ok(Self { private_key })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let pem = std::fs::read_to_string(path.as_ref())?;
        debug!("Loaded private key from {:?}", path.as_ref());
        Self::from_private_pem(&pem)
    }

    pub fn private_key_pem(&self) -> anyhow::Result<String> {
        Ok(self.private_key.to_pkcs1_pem(LineEnding::LF)?.to_string())
    }

    pub fn public_key_pem(&self) -> anyhow::Result<String> {
        Ok(RsaPublicKey::from(&self.private_key).to_pkcs1_pem(LineEnding::LF)?)
    }

    /// Write the private key and public key PEM files
    pub fn save(&self, private_path: impl AsRef<Path>, public_path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(private_path.as_ref(), self.private_key_pem()?)?;
        std::fs::write(public_path.as_ref(), self.public_key_pem()?)?;
        info!("Key pair written to {:?} and {:?}", private_path.as_ref(), public_path.as_ref());
        Ok(())
    }
}

impl AsymmetricCipher for RsaOaepCipher {
    fn encrypt(&self, public_key: &str, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let public_key = RsaPublicKey::from_pkcs1_pem(public_key.trim())
            .map_err(|e| CryptoError::EncryptionFailed(format!("bad public key: {}", e)))?;

        public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private_key
            .decrypt(Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::DecryptFailed(e.to_string()))
    }
}
