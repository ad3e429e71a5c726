use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use tracing::{debug, info};

use crate::protocol::SYMMETRIC_KEY_SIZE;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// Peer id → symmetric key. A single lock serializes every read and write.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: Mutex<HashMap<String, SymmetricKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SymmetricKey>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install `key` for `peer`, replacing any earlier key.
    pub fn put(&self, peer: &str, key: SymmetricKey) {
        if self.lock().insert(peer.to_string(), key).is_some() {
            debug!("Replaced symmetric key for peer '{}'", peer);
        } else {
            debug!("Stored symmetric key for peer '{}'", peer);
        }
    }

    pub fn get(&self, peer: &str) -> Option<SymmetricKey> {
        self.lock().get(peer).copied()
    }

    pub fn has(&self, peer: &str) -> bool {
        self.lock().contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.lock().keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Snapshot every key to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = bincode::serialize(&*self.lock())?;
        std::fs::write(path.as_ref(), bytes)?;
        debug!("Key store saved to {:?}", path.as_ref());
        Ok(())
    }

    /// Restore a snapshot written by [`KeyStore::save`]; a missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let keys: HashMap<String, SymmetricKey> = bincode::deserialize(&std::fs::read(path)?)?;
        info!("Loaded {} symmetric keys from {:?}", keys.len(), path);
        Ok(Self { keys: Mutex::new(keys) })
    }
}
