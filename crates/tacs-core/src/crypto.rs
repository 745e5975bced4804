//! AES-128-CBC block primitive.
//!
//! Every call starts a fresh CBC chain with a zero IV and no padding. Callers
//! must pass whole blocks. This matches what the SORC firmware does for both
//! the handshake blocks and the encrypted records.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes.
pub const KEY_SIZE: usize = 16;

const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// AES-128-CBC with zero IV and no padding.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesCbc {
    key: [u8; KEY_SIZE],
}

impl AesCbc {
    /// Create from a 16-byte key.
    pub const fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Create from a key slice.
    pub fn from_slice(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] =
            key.try_into().map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Encrypt whole blocks.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::EncryptionFailed { len: plaintext.len() });
        }
        let cipher = Encryptor::new(&self.key.into(), &ZERO_IV.into());
        Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(plaintext))
    }

    /// Decrypt whole blocks.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::DecryptionFailed { len: ciphertext.len() });
        }
        let cipher = Decryptor::new(&self.key.into(), &ZERO_IV.into());
        cipher
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed { len: ciphertext.len() })
    }

    /// Encrypt exactly one block.
    pub fn encrypt_block(&self, block: &[u8; BLOCK_SIZE]) -> Result<[u8; BLOCK_SIZE], CryptoError> {
        let out = self.encrypt(block)?;
        out.as_slice()
            .try_into()
            .map_err(|_| CryptoError::EncryptionFailed { len: out.len() })
    }

    /// Decrypt exactly one block.
    pub fn decrypt_block(&self, block: &[u8; BLOCK_SIZE]) -> Result<[u8; BLOCK_SIZE], CryptoError> {
        let out = self.decrypt(block)?;
        out.as_slice()
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailed { len: out.len() })
    }
}

impl std::fmt::Debug for AesCbc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCbc").field("key", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    // FIPS-197 appendix C.1 (single block, so CBC with zero IV equals ECB)
    const KEY: [u8; 16] = hex!("000102030405060708090a0b0c0d0e0f");
    const PLAIN: [u8; 16] = hex!("00112233445566778899aabbccddeeff");
    const CIPHER: [u8; 16] = hex!("69c4e0d86a7b0430d8cdb78070b4c55a");

    #[test]
    fn known_answer() {
        let aes = AesCbc::new(KEY);
        assert_eq!(aes.encrypt_block(&PLAIN).unwrap(), CIPHER);
        assert_eq!(aes.decrypt_block(&CIPHER).unwrap(), PLAIN);
    }

    #[test]
    fn chains_blocks() {
        let aes = AesCbc::new(KEY);
        let two = [PLAIN, PLAIN].concat();
        let encrypted = aes.encrypt(&two).unwrap();
        assert_eq!(encrypted[..16], CIPHER);
        assert_ne!(encrypted[16..], CIPHER);
        assert_eq!(aes.decrypt(&encrypted).unwrap(), two);
    }

    #[test]
    fn rejects_partial_blocks() {
        let aes = AesCbc::new(KEY);
        assert_eq!(aes.encrypt(&[0; 15]), Err(CryptoError::EncryptionFailed { len: 15 }));
        assert_eq!(aes.decrypt(&[0; 17]), Err(CryptoError::DecryptionFailed { len: 17 }));
    }

    #[test]
    fn rejects_wrong_key_length() {
        assert!(matches!(AesCbc::from_slice(&[0; 15]), Err(CryptoError::InvalidKeyLength(15))));
    }

    #[test]
    fn debug_redacts_key() {
        let debug = format!("{:?}", AesCbc::new(KEY));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0, 1, 2"));
    }
}
