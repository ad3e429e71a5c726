use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::crypto::{CryptoError, SymmetricCipher};
use crate::protocol::{IV_SIZE, SYMMETRIC_KEY_SIZE};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES-128 in CBC mode with PKCS#7 padding
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes128Cbc;

fn check_lengths(key: &[u8], iv: &[u8]) -> Result<(), CryptoError> {
    if key.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength { expected: SYMMETRIC_KEY_SIZE, got: key.len() });
    }
    if iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidKeyLength { expected: IV_SIZE, got: iv.len() });
    }
    Ok(())
}

impl SymmetricCipher for Aes128Cbc {
    fn encrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_lengths(key, iv)?;
        let cipher = Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_lengths(key, iv)?;
        if data.len() % 16 != 0 {
            return Err(CryptoError::DecryptFailed(format!(
                "ciphertext length {} is not a multiple of the block size",
                data.len()
            )));
        }
        let cipher = Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| CryptoError::DecryptFailed(e.to_string()))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| CryptoError::DecryptFailed("bad padding".to_string()))
    }
}
