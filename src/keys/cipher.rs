use std::sync::Arc;

use tracing::trace;

use crate::crypto::{CryptoError, SymmetricCipher};
use crate::keys::store::KeyStore;
use crate::protocol::IV_SIZE;

/// Every message is encrypted under an all-zero IV; equal plaintexts under
/// one key produce equal ciphertexts.
const ZERO_IV: [u8; IV_SIZE] = [0u8; IV_SIZE];

/// Encrypts message bodies with the key stored for each peer
pub struct MessageCipher {
    store: Arc<KeyStore>,
    symmetric: Arc<dyn SymmetricCipher>,
}

impl MessageCipher {
    pub fn new(store: Arc<KeyStore>, symmetric: Arc<dyn SymmetricCipher>) -> Self {
        Self { store, symmetric }
    }

    pub fn encrypt_for_peer(&self, peer: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self
            .store
            .get(peer)
            .ok_or_else(|| CryptoError::KeyMissing(peer.to_string()))?;
        let ciphertext = self.symmetric.encrypt(&key, &ZERO_IV, plaintext)?;
        trace!("Encrypted {} bytes for '{}'", plaintext.len(), peer);
        Ok(ciphertext)
    }

    pub fn decrypt_for_peer(&self, peer: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self
            .store
            .get(peer)
            .ok_or_else(|| CryptoError::KeyMissing(peer.to_string()))?;
        let plaintext = self.symmetric.decrypt(&key, &ZERO_IV, ciphertext)?;
        trace!("Decrypted {} bytes from '{}'", ciphertext.len(), peer);
        Ok(plaintext)
    }
}
