use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::RandomSource;

/// Operating-system randomness
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn bytes(&self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        OsRng.fill_bytes(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_requested_length() {
        assert_eq!(OsRandom.bytes(16).len(), 16);
        assert!(OsRandom.bytes(0).is_empty());
    }

    #[test]
    fn draws_differ() {
        assert_ne!(OsRandom.bytes(32), OsRandom.bytes(32));
    }
}
