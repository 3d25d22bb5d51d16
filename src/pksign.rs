//! Abstraction over public key signature algorithms.

use crate::always::*;
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use signature::Signer;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub use getrandom::Error as EntropyError;

/// Identifies the signature algorithm recorded in certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519, verified with `verify_strict()`.
    #[default]
    #[serde(rename = "ED25519")]
    Ed25519,
}

/// A publishable ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey {
    value: [u8; PUBKEY],
}

impl PublicKey {
    /// The raw bytes of the `PublicKey`.
    pub fn as_bytes(&self) -> &[u8; PUBKEY] {
        &self.value
    }

    /// Create from bytes (not checked to be a valid curve point until verification).
    pub fn from_bytes(value: [u8; PUBKEY]) -> Self {
        Self { value }
    }

    /// Encode in lowercase hexidecimal
    pub fn to_hex(&self) -> String {
        hex::encode(self.value)
    }
}

impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = hex::FromHexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let mut value = [0; PUBKEY];
        hex::decode_to_slice(s, &mut value)?;
        Ok(Self { value })
    }
}

impl From<PublicKey> for String {
    fn from(k: PublicKey) -> Self {
        k.to_hex()
    }
}

/// An ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature {
    value: [u8; SIGNATURE],
}

impl Signature {
    /// The raw bytes of the `Signature`.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE] {
        &self.value
    }

    /// Create from bytes.
    pub fn from_bytes(value: [u8; SIGNATURE]) -> Self {
        Self { value }
    }

    /// Encode in lowercase hexidecimal
    pub fn to_hex(&self) -> String {
        hex::encode(self.value)
    }
}

impl core::fmt::Debug for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_tuple("Signature").field(&self.to_hex()).finish()
    }
}

impl TryFrom<String> for Signature {
    type Error = hex::FromHexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let mut value = [0; SIGNATURE];
        hex::decode_to_slice(s, &mut value)?;
        Ok(Self { value })
    }
}

impl From<Signature> for String {
    fn from(s: Signature) -> Self {
        s.to_hex()
    }
}

/// Private key material, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    value: [u8; SECRET],
}

impl SecretKey {
    /// Create from bytes.
    pub fn from_bytes(value: [u8; SECRET]) -> Self {
        Self { value }
    }

    /// Return a [SecretKey] with entropy from [getrandom::fill()].
    pub fn generate() -> Result<Self, EntropyError> {
        let mut key = Self { value: [0; SECRET] };
        getrandom::fill(&mut key.value)?;
        Ok(key)
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.value)
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing_key().verifying_key().to_bytes())
    }

    /// Sign `msg`.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        let sig = self.signing_key().sign(msg);
        Signature::from_bytes(sig.to_bytes())
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = Zeroizing::new(hex::encode(self.value));
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Zeroizing::new(String::deserialize(deserializer)?);
        let mut key = Self { value: [0; SECRET] };
        hex::decode_to_slice(text.as_bytes(), &mut key.value).map_err(serde::de::Error::custom)?;
        Ok(key)
    }
}

/// A current key pair. The public half is cached alongside the secret.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Build from an existing secret.
    pub fn new(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Generate a fresh pair from the OS CSPRNG.
    pub fn generate() -> Result<Self, EntropyError> {
        Ok(Self::new(SecretKey::generate()?))
    }

    /// The public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The private key.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Consume the pair, keeping only the private key.
    pub fn into_secret_key(self) -> SecretKey {
        self.secret
    }

    /// Sign `msg` with the private key.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.secret.sign(msg)
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Verify `signature` over `msg` under `public_key`.
///
/// Returns `false` for an invalid public key rather than an error.
pub fn verify_signature(public_key: &PublicKey, signature: &Signature, msg: &[u8]) -> bool {
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    if let Ok(pubkey) = VerifyingKey::from_bytes(public_key.as_bytes()) {
        pubkey.verify_strict(msg, &sig).is_ok()
    } else {
        false
    }
}
