use crate::always::*;
use blake2::Blake2b512;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha512};
use subtle::{Choice, ConstantTimeEq};

/// Identifies the digest algorithm recorded in certificates and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-512 (the reference protocol digest).
    #[default]
    #[serde(rename = "SHA512")]
    Sha512,

    /// BLAKE2b with 512 bit output.
    #[serde(rename = "BLAKE2B512")]
    Blake2b512,
}

impl DigestAlgorithm {
    /// Compute the digest of `input` with this algorithm.
    pub fn digest(&self, input: &[u8]) -> Digest {
        let mut value = [0; DIGEST];
        match self {
            DigestAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(input);
                value.copy_from_slice(&hasher.finalize());
            }
            DigestAlgorithm::Blake2b512 => {
                let mut hasher = Blake2b512::new();
                hasher.update(input);
                value.copy_from_slice(&hasher.finalize());
            }
        }
        Digest::from_bytes(value)
    }
}

/// Buffer containing a digest, with constant time comparison.
#[derive(Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    value: [u8; DIGEST],
}

impl Digest {
    /// The raw bytes of the `Digest`.
    pub fn as_bytes(&self) -> &[u8; DIGEST] {
        &self.value
    }

    /// Create from bytes.
    pub fn from_bytes(value: [u8; DIGEST]) -> Self {
        Self { value }
    }

    /// Load from a slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, core::array::TryFromSliceError> {
        Ok(Self::from_bytes(bytes.try_into()?))
    }

    /// Decode from hex
    pub fn from_hex(hex: impl AsRef<[u8]>) -> Result<Self, hex::FromHexError> {
        let mut value = [0; DIGEST];
        hex::decode_to_slice(hex, &mut value)?;
        Ok(Self { value })
    }

    /// Encode in lowercase hexidecimal
    pub fn to_hex(&self) -> String {
        hex::encode(self.value)
    }
}

impl ConstantTimeEq for Digest {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.value[..].ct_eq(&other.value[..])
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl core::hash::Hash for Digest {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl core::fmt::Debug for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_tuple("Digest").field(&self.to_hex()).finish()
    }
}

impl core::fmt::Display for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Digest {
    type Error = hex::FromHexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_hex()
    }
}
