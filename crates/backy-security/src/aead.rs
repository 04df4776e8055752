//! AEAD service: AES-256-GCM over opaque blobs.
//!
//! Output framing is `nonce || ciphertext` where the 16-byte authentication
//! tag is part of the ciphertext under the AES-GCM API convention.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{Result, SecurityError};

/// AES-256 key length in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// Encrypt a blob under a 256-bit key with a fresh random nonce.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Err(SecurityError::EmptyInput("nothing to encrypt".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| SecurityError::InvalidKey(format!("expected {KEY_SIZE} byte key")))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|err| SecurityError::EncryptionFailed(err.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext` blob. Any modification of the ciphertext
/// fails authentication.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(SecurityError::EmptyInput("nothing to decrypt".into()));
    }
    if data.len() <= NONCE_SIZE {
        return Err(SecurityError::DecryptionFailed(format!(
            "input shorter than the {NONCE_SIZE} byte nonce"
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| SecurityError::InvalidKey(format!("expected {KEY_SIZE} byte key")))?;

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| SecurityError::DecryptionFailed("authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::generate_symmetric_key;

    #[test]
    fn roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"backup payload bytes";
        let encrypted = encrypt(&key, plaintext).unwrap();
        assert_ne!(&encrypted[NONCE_SIZE..], plaintext);
        assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn tampering_fails_authentication() {
        let key = generate_symmetric_key();
        let mut encrypted = encrypt(&key, b"payload").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &encrypted),
            Err(SecurityError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn empty_input_is_an_error() {
        let key = generate_symmetric_key();
        assert!(matches!(
            encrypt(&key, b""),
            Err(SecurityError::EmptyInput(_))
        ));
        assert!(matches!(
            decrypt(&key, b""),
            Err(SecurityError::EmptyInput(_))
        ));
    }

    #[test]
    fn wrong_key_size_is_rejected() {
        assert!(matches!(
            encrypt(&[0u8; 16], b"data"),
            Err(SecurityError::InvalidKey(_))
        ));
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = generate_symmetric_key();
        let a = encrypt(&key, b"same input").unwrap();
        let b = encrypt(&key, b"same input").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }
}
