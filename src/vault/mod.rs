//! Credential vault: symmetric encryption for processor tokens at rest.
//!
//! AES-256-GCM with a random 12-byte nonce prepended to the ciphertext,
//! base64-encoded for storage. Plaintext token material exists only
//! transiently in memory around an encrypt/decrypt call and is never
//! logged or persisted.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("ciphertext is not valid base64")]
    Encoding,
    #[error("ciphertext too short")]
    Truncated,
}

impl From<VaultError> for crate::errors::ServiceError {
    fn from(err: VaultError) -> Self {
        crate::errors::ServiceError::VaultError(err.to_string())
    }
}

/// Encrypts and decrypts processor credentials with a process-wide key
/// sourced from configuration.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material must never surface through Debug output.
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Encrypts `plaintext`, producing base64 of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut buf = nonce_bytes.to_vec();
        buf.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(buf))
    }

    /// Decrypts a value produced by [`CredentialVault::encrypt`].
    pub fn decrypt(&self, stored: &str) -> Result<String, VaultError> {
        let raw = BASE64.decode(stored).map_err(|_| VaultError::Encoding)?;
        if raw.len() < NONCE_LEN {
            return Err(VaultError::Truncated);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn vault() -> CredentialVault {
        CredentialVault::new([7u8; 32])
    }

    #[test]
    fn round_trip() {
        let v = vault();
        let token = "APP_USR-1234567890-access-token";
        let stored = v.encrypt(token).unwrap();
        assert_ne!(stored, token);
        assert_eq!(v.decrypt(&stored).unwrap(), token);
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let v = vault();
        let a = v.encrypt("refresh-token").unwrap();
        let b = v.encrypt("refresh-token").unwrap();
        // random nonce per message
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let v = vault();
        let stored = v.encrypt("secret").unwrap();
        let mut raw = BASE64.decode(&stored).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = BASE64.encode(raw);
        assert_matches!(v.decrypt(&tampered), Err(VaultError::Decrypt));
    }

    #[test]
    fn wrong_key_fails() {
        let stored = vault().encrypt("secret").unwrap();
        let other = CredentialVault::new([8u8; 32]);
        assert_matches!(other.decrypt(&stored), Err(VaultError::Decrypt));
    }

    #[test]
    fn malformed_inputs() {
        let v = vault();
        assert_matches!(v.decrypt("!!!not-base64!!!"), Err(VaultError::Encoding));
        assert_matches!(v.decrypt(&BASE64.encode([1u8; 4])), Err(VaultError::Truncated));
    }

    #[test]
    fn debug_output_hides_key_material() {
        assert_eq!(format!("{:?}", vault()), "CredentialVault { .. }");
    }
}
