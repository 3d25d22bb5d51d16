//! Encrypted and authenticated configuration at rest.
//!
//! A [SealedStore] wraps another [ConfigStore] and seals every payload with ChaCha20Poly1305:
//!
//! ```text
//! NONCE || CIPHERTEXT || TAG
//! ```
//!
//! A fresh random nonce is drawn for every write. The [StorageKey] is either random or derived
//! from a passphrase with Argon2id.

use crate::always::*;
use crate::store::ConfigStore;
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use std::io;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key used to seal configuration, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageKey {
    value: [u8; STORAGE_KEY],
}

impl StorageKey {
    /// Create from bytes.
    pub fn from_bytes(value: [u8; STORAGE_KEY]) -> Self {
        Self { value }
    }

    /// Return a [StorageKey] with entropy from [getrandom::fill()].
    pub fn generate() -> Result<Self, getrandom::Error> {
        let mut key = Self {
            value: [0; STORAGE_KEY],
        };
        getrandom::fill(&mut key.value)?;
        Ok(key)
    }

    /// Derive a key from `passphrase` and `salt` with Argon2id (default parameters).
    pub fn from_passphrase(passphrase: &[u8], salt: &[u8]) -> io::Result<Self> {
        if salt.len() < MIN_SALT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("salt must be at least {MIN_SALT} bytes; got {}", salt.len()),
            ));
        }
        let mut key = Self {
            value: [0; STORAGE_KEY],
        };
        Argon2::default()
            .hash_password_into(passphrase, salt, &mut key.value)
            .map_err(|err| io::Error::other(format!("argon2: {err}")))?;
        Ok(key)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.value))
    }
}

impl core::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("StorageKey(..)")
    }
}

/// A [ConfigStore] that encrypts everything it hands to the inner store.
pub struct SealedStore<S> {
    inner: S,
    key: StorageKey,
}

impl<S: ConfigStore> SealedStore<S> {
    /// Seal payloads stored in `inner` under `key`.
    pub fn new(inner: S, key: StorageKey) -> Self {
        Self { inner, key }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn seal(&self, plaintext: &[u8]) -> io::Result<Vec<u8>> {
        let mut nonce = [0; NONCE];
        getrandom::fill(&mut nonce).map_err(|err| io::Error::other(err.to_string()))?;
        let payload = Payload {
            msg: plaintext,
            aad: SEALED_CONFIG_CONTEXT,
        };
        let ciphertext = self
            .key
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| io::Error::other("sealing configuration failed"))?;
        let mut buf = Vec::with_capacity(NONCE + ciphertext.len());
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&ciphertext);
        Ok(buf)
    }

    fn open(&self, buf: &[u8]) -> io::Result<Vec<u8>> {
        if buf.len() < NONCE + AEAD_TAG {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "sealed configuration needs at least {} bytes; got {}",
                    NONCE + AEAD_TAG,
                    buf.len()
                ),
            ));
        }
        let (nonce, ciphertext) = buf.split_at(NONCE);
        let payload = Payload {
            msg: ciphertext,
            aad: SEALED_CONFIG_CONTEXT,
        };
        self.key
            .cipher()
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "sealed configuration failed authentication",
                )
            })
    }
}

impl<S: ConfigStore> ConfigStore for SealedStore<S> {
    fn exists(&self) -> io::Result<bool> {
        self.inner.exists()
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        let buf = self.inner.load()?;
        self.open(&buf)
    }

    fn store(&self, buf: &[u8]) -> io::Result<()> {
        let sealed = self.seal(buf)?;
        self.inner.store(&sealed)
    }

    fn delete(&self) -> io::Result<()> {
        self.inner.delete()
    }
}
