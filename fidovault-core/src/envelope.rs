//! Authenticated encryption of short secrets.
//!
//! Sealed blobs are laid out as `nonce || ciphertext || tag` with a fresh
//! random 24-byte nonce per call. No associated data is bound: a blob sealed
//! in one vault opens anywhere else, provided the key matches.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// XChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// AEAD key size in bytes.
pub const KEY_SIZE: usize = 32;

/// A 256-bit wrapping key derived from a token assertion.
///
/// Zeroized on drop; never logged or serialized.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// The secret a vault protects.
///
/// Usually 32 bytes; user-supplied hex input of any length is carried
/// as-is. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    /// Wraps existing key material.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parses key material from a hex string.
    ///
    /// # Errors
    ///
    /// Fails on odd length or non-hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex::decode(s)?))
    }

    /// Generates a fresh random 32-byte master key.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Rng`] if the system RNG is unavailable.
    pub fn generate() -> Result<Self> {
        let mut bytes = vec![0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes).map_err(|_| Error::Rng)?;
        Ok(Self(bytes))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form, for echoing a generated key back to the user.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Seals `plaintext` under `key`, returning `nonce || ciphertext || tag`.
///
/// # Errors
///
/// Fails with [`Error::Rng`] if no nonce randomness is available.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(|_| Error::Rng)?;

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("XChaCha20-Poly1305 encryption failed".into()))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Opens a sealed blob produced by [`seal`].
///
/// # Errors
///
/// Fails with [`Error::ShortCiphertext`] when the input cannot even hold a
/// nonce, and [`Error::Decrypt`] on any authentication failure.
pub fn open(key: &DerivedKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(Error::ShortCiphertext {
            len: sealed.len(),
            min: NONCE_SIZE,
        });
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key(0x42);
        let plaintext = b"the master key itself";

        let sealed = seal(&key, plaintext).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

        let opened = open(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = test_key(0x01);
        let sealed = seal(&key, b"").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(open(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn every_single_byte_mutation_is_detected() {
        let key = test_key(0x42);
        let sealed = seal(&key, b"tamper target").unwrap();

        for i in 0..sealed.len() {
            let mut mutated = sealed.clone();
            mutated[i] ^= 0x01;
            assert!(
                matches!(open(&key, &mutated), Err(Error::Decrypt)),
                "mutation at byte {i} went undetected"
            );
        }
    }

    #[test]
    fn truncation_is_detected() {
        let key = test_key(0x42);
        let sealed = seal(&key, b"some secret").unwrap();

        // Shorter than the nonce: structural error.
        assert!(matches!(
            open(&key, &sealed[..NONCE_SIZE - 1]),
            Err(Error::ShortCiphertext { len, min }) if len == NONCE_SIZE - 1 && min == NONCE_SIZE
        ));

        // Nonce intact but tag clipped: authentication error.
        assert!(matches!(
            open(&key, &sealed[..sealed.len() - 1]),
            Err(Error::Decrypt)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(&test_key(0x42), b"secret").unwrap();
        assert!(matches!(open(&test_key(0x43), &sealed), Err(Error::Decrypt)));
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let key = test_key(0x42);
        let a = seal(&key, b"same plaintext").unwrap();
        let b = seal(&key, b"same plaintext").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn sealed_blobs_are_standalone() {
        // No associated data: a blob moves between vaults with the key.
        let key = test_key(0x07);
        let sealed = seal(&key, b"portable").unwrap();
        let reopened = open(&DerivedKey::from_bytes(*key.as_bytes()), &sealed).unwrap();
        assert_eq!(reopened, b"portable");
    }

    #[test]
    fn derived_key_debug_is_redacted() {
        let key = test_key(0x42);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }

    #[test]
    fn master_key_hex_roundtrip() {
        let master = MasterKey::from_hex("00ff10").unwrap();
        assert_eq!(master.as_bytes(), &[0x00, 0xff, 0x10]);
        assert_eq!(master.to_hex(), "00ff10");
        assert!(MasterKey::from_hex("zz").is_err());
    }

    #[test]
    fn generated_master_keys_are_32_bytes_and_distinct() {
        let a = MasterKey::generate().unwrap();
        let b = MasterKey::generate().unwrap();
        assert_eq!(a.as_bytes().len(), KEY_SIZE);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
