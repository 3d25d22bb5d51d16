//! Sizes and protocol constants (good place to start).

use crate::tag::Protocol;

/// Size of a [Tag][crate::Tag] in bytes.
pub const TAG: usize = 20;

/// Length of a textually encoded [Tag][crate::Tag], not counting the leading `#`.
pub const TAG_TEXT: usize = TAG * 8 / 5;

/// Size of a [Digest][crate::Digest] in bytes (SHA-512 and BLAKE2b-512 both produce 64).
pub const DIGEST: usize = 64;

/// Size of an ed25519 public key.
pub const PUBKEY: usize = 32;

/// Size of an ed25519 private key (the 32 byte secret seed).
pub const SECRET: usize = 32;

/// Size of an ed25519 signature.
pub const SIGNATURE: usize = 64;

/// Size of the key used to seal configuration at rest.
pub const STORAGE_KEY: usize = 32;

/// ChaCha20Poly1305 nonce size.
pub const NONCE: usize = 12;

/// ChaCha20Poly1305 authentication tag size.
pub const AEAD_TAG: usize = 16;

/// Shortest salt accepted when deriving a storage key from a passphrase.
pub const MIN_SALT: usize = 16;

/// The newest protocol version this crate speaks.
pub const PROTOCOL: Protocol = Protocol::fixed(1);

/// Associated data bound into every sealed configuration payload.
pub static SEALED_CONFIG_CONTEXT: &[u8] = b"zf-notary.sealed-config.v1";

/// Extension used for per-protocol configuration files.
pub static CONFIG_EXTENSION: &str = "config";
