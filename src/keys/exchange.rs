use std::sync::Arc;

use tracing::{info, warn};

use crate::crypto::{AsymmetricCipher, CryptoError, RandomSource};
use crate::keys::store::{KeyStore, SymmetricKey};
use crate::protocol::SYMMETRIC_KEY_SIZE;

/// Bootstraps per-peer symmetric keys over an asymmetric cipher.
///
/// Both roles end up keyed without any acknowledgement: the initiator stores
/// its key as soon as the envelope is built, the receiver once it decrypts.
pub struct KeyExchangeManager {
    store: Arc<KeyStore>,
    asymmetric: Arc<dyn AsymmetricCipher>,
    random: Arc<dyn RandomSource>,
}

impl KeyExchangeManager {
    pub fn new(
        store: Arc<KeyStore>,
        asymmetric: Arc<dyn AsymmetricCipher>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self { store, asymmetric, random }
    }

    /// Generate a fresh key for `peer`, store it, and return it encrypted under `peer_public_key`.
    pub fn initiate(&self, peer: &str, peer_public_key: &str) -> Result<Vec<u8>, CryptoError> {
        let key = normalize_key(self.random.bytes(SYMMETRIC_KEY_SIZE));
        let envelope = self.asymmetric.encrypt(peer_public_key, &key)?;
        self.store.put(peer, key);
        info!("Initiated key exchange with '{}' ({} byte envelope)", peer, envelope.len());
        Ok(envelope)
    }

    /// Decrypt an envelope from `peer` and install the key it carries.
    pub fn receive(&self, peer: &str, envelope: &[u8]) -> Result<(), CryptoError> {
        let decrypted = self.asymmetric.decrypt(envelope).map_err(|e| match e {
            CryptoError::DecryptFailed(_) => e,
            other => CryptoError::DecryptFailed(other.to_string()),
        })?;
        if decrypted.is_empty() {
            return Err(CryptoError::DecryptFailed("envelope decrypted to nothing".to_string()));
        }

        if decrypted.len() != SYMMETRIC_KEY_SIZE {
            warn!(
                "Key from '{}' is {} bytes; adjusting to {}",
                peer,
                decrypted.len(),
                SYMMETRIC_KEY_SIZE
            );
        }
        self.store.put(peer, normalize_key(decrypted));
        info!("Installed symmetric key from '{}'", peer);
        Ok(())
    }
}

/// Truncate or zero-pad to exactly one symmetric key.
fn normalize_key(mut bytes: Vec<u8>) -> SymmetricKey {
    bytes.resize(SYMMETRIC_KEY_SIZE, 0);
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    key
}
