//! Envelope encryption for ChunkVault
//!
//! Every file gets a random data key (DEK) that encrypts its chunks.
//! The DEK is stored wrapped under a key-encryption key (KEK) derived from
//! the caller's password with PBKDF2-HMAC-SHA256 and a per-file salt.
//!
//! Sealed format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! A fresh nonce is drawn from the OS RNG on every call to [`EnvelopeCrypto::encrypt`].

use crate::error::{Result, VaultError};
use crate::DEFAULT_PBKDF2_ITERATIONS;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use ring::pbkdf2;
use std::fmt;
use std::num::NonZeroU32;

/// AES-256-GCM key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (12 bytes / 96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Per-file PBKDF2 salt size
pub const SALT_SIZE: usize = 16;

/// Bytes added to every sealed blob
pub const OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// AES-256 key material. Zeroed on drop, never printed.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_SIZE {
            return Err(VaultError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(slice);
        Ok(Self(key))
    }

    fn random() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.as_bytes()).map_err(|e| VaultError::Encryption(e.to_string()))
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// Caller-supplied password. Only ever used to derive a wrapping key.
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.iter_mut().for_each(|b| *b = 0);
    }
}

/// The envelope crypto engine.
///
/// Holds no key material itself; only the PBKDF2 work factor.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCrypto {
    iterations: NonZeroU32,
}

impl Default for EnvelopeCrypto {
    fn default() -> Self {
        Self {
            iterations: NonZeroU32::new(DEFAULT_PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl EnvelopeCrypto {
    /// Create an engine with the given PBKDF2 iteration count.
    pub fn new(iterations: u32) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
            VaultError::KeyDerivation("iteration count must be non-zero".to_string())
        })?;
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Random 256-bit data key.
    pub fn generate_data_key(&self) -> EncryptionKey {
        EncryptionKey::random()
    }

    /// Random per-file salt.
    pub fn generate_salt(&self) -> [u8; SALT_SIZE] {
        use rand::RngCore;
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Derive a 256-bit wrapping key from a password with PBKDF2-HMAC-SHA256.
    pub fn derive_wrapping_key(&self, password: &Password, salt: &[u8]) -> Result<EncryptionKey> {
        if salt.is_empty() {
            return Err(VaultError::KeyDerivation("salt must not be empty".to_string()));
        }

        let mut out = [0u8; KEY_SIZE];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            salt,
            password.expose(),
            &mut out,
        );
        let key = EncryptionKey(out);
        out.iter_mut().for_each(|b| *b = 0);
        Ok(key)
    }

    /// Seal `plaintext` under `key`. Output is `nonce || ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
        use rand::RngCore;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = key
            .cipher()?
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed blob. Any tag mismatch, including a truncated blob,
    /// is reported as [`VaultError::Authentication`].
    pub fn decrypt(&self, sealed: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
        if sealed.len() < OVERHEAD {
            return Err(VaultError::Authentication);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);

        key.cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::Authentication)
    }

    /// Encrypt the raw bytes of `data_key` under `wrapping_key`.
    pub fn wrap_key(&self, data_key: &EncryptionKey, wrapping_key: &EncryptionKey) -> Result<Vec<u8>> {
        self.encrypt(data_key.as_bytes(), wrapping_key)
    }

    /// Recover a data key sealed by [`EnvelopeCrypto::wrap_key`].
    pub fn unwrap_key(&self, wrapped: &[u8], wrapping_key: &EncryptionKey) -> Result<EncryptionKey> {
        let mut raw = self.decrypt(wrapped, wrapping_key)?;
        let key = EncryptionKey::from_slice(&raw);
        raw.iter_mut().for_each(|b| *b = 0);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> EnvelopeCrypto {
        EnvelopeCrypto::new(1_000).unwrap()
    }

    #[test]
    fn test_encryption_roundtrip() {
        let crypto = fast();
        let key = crypto.generate_data_key();
        let plaintext = b"secret message";

        let sealed = crypto.encrypt(plaintext, &key).unwrap();
        assert_eq!(sealed.len(), plaintext.len() + OVERHEAD);

        let opened = crypto.decrypt(&sealed, &key).unwrap();
        assert_eq!(plaintext.as_slice(), opened.as_slice());
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let crypto = fast();
        let key = crypto.generate_data_key();

        let sealed = crypto.encrypt(&[], &key).unwrap();
        assert_eq!(sealed.len(), OVERHEAD);
        assert!(crypto.decrypt(&sealed, &key).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let crypto = fast();
        let key = crypto.generate_data_key();

        let a = crypto.encrypt(b"same input", &key).unwrap();
        let b = crypto.encrypt(b"same input", &key).unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let crypto = fast();
        let key1 = crypto.generate_data_key();
        let key2 = crypto.generate_data_key();

        let sealed = crypto.encrypt(b"secret", &key1).unwrap();
        let result = crypto.decrypt(&sealed, &key2);
        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let crypto = fast();
        let key = crypto.generate_data_key();

        let mut sealed = crypto.encrypt(b"secret", &key).unwrap();
        sealed[NONCE_SIZE] ^= 0xFF;

        assert!(matches!(
            crypto.decrypt(&sealed, &key),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let crypto = fast();
        let key = crypto.generate_data_key();
        assert!(matches!(
            crypto.decrypt(&[0u8; OVERHEAD - 1], &key),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn test_derivation_is_deterministic_per_salt() {
        let crypto = fast();
        let salt = crypto.generate_salt();
        let password = Password::from("correct horse");

        let k1 = crypto.derive_wrapping_key(&password, &salt).unwrap();
        let k2 = crypto.derive_wrapping_key(&password, &salt).unwrap();
        assert_eq!(k1, k2);

        let other_salt = crypto.generate_salt();
        let k3 = crypto.derive_wrapping_key(&password, &other_salt).unwrap();
        assert_ne!(k1, k3);

        let k4 = crypto
            .derive_wrapping_key(&Password::from("battery staple"), &salt)
            .unwrap();
        assert_ne!(k1, k4);
    }

    #[test]
    fn test_wrap_unwrap() {
        let crypto = fast();
        let dek = crypto.generate_data_key();
        let salt = crypto.generate_salt();
        let kek = crypto
            .derive_wrapping_key(&Password::from("pw"), &salt)
            .unwrap();

        let wrapped = crypto.wrap_key(&dek, &kek).unwrap();
        assert_eq!(wrapped.len(), KEY_SIZE + OVERHEAD);
        assert_eq!(crypto.unwrap_key(&wrapped, &kek).unwrap(), dek);

        let wrong = crypto
            .derive_wrapping_key(&Password::from("not pw"), &salt)
            .unwrap();
        assert!(matches!(
            crypto.unwrap_key(&wrapped, &wrong),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn test_empty_salt_rejected() {
        let crypto = fast();
        assert!(matches!(
            crypto.derive_wrapping_key(&Password::from("pw"), &[]),
            Err(VaultError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(EnvelopeCrypto::new(0).is_err());
        assert_eq!(EnvelopeCrypto::default().iterations(), DEFAULT_PBKDF2_ITERATIONS);
    }

    #[test]
    fn test_secrets_are_redacted() {
        let crypto = fast();
        let key = crypto.generate_data_key();
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
        assert_eq!(format!("{:?}", Password::from("hunter2")), "Password([REDACTED])");
    }

    #[test]
    fn test_salt_is_random() {
        let crypto = fast();
        assert_ne!(crypto.generate_salt(), crypto.generate_salt());
    }
}
