//! A digital notary: issues, rotates and retires signing keys, and wraps documents in
//! content-addressed, signed contracts.
//!
//! The layers, leaves first:
//!
//! * [Controller] is a generic table driven state machine.
//! * [SecurityModule] performs digest, sign, verify, generate, rotate and erase, gated by a
//!   [Controller] over [SecurityState], and persists every change to a [ConfigStore].
//! * [Notary] issues a chain of [Certificate]s (each signed by the key of the one before it) and
//!   notarizes [Document]s into [Contract]s that cite the certifying certificate.
//!
//! # Quick start
//!
//! ```
//! use zf_notary::{Document, MemoryStore, Notary, PROTOCOL, SecurityModule};
//! use serde_json::json;
//!
//! let module = SecurityModule::open(MemoryStore::new()).unwrap();
//! let notary = Notary::new(vec![(PROTOCOL, module)]).unwrap();
//!
//! let c1 = notary.generate_key().unwrap();
//! notary.activate_key(&c1).unwrap();
//!
//! let document = Document::new(json!({"pay": "alice", "amount": 100})).unwrap();
//! let contract = notary.notarize_document(&document).unwrap();
//! assert!(notary.is_valid(&contract, &c1));
//!
//! let c2 = notary.refresh_key().unwrap();
//! assert_eq!(c2.previous, Some(c1.citation().unwrap()));
//! assert!(notary.is_valid(&contract, &c1));
//! notary.validate_certificate_chain(&[c1, c2]).unwrap();
//! ```

mod always;
mod certificate;
mod contract;
mod controller;
mod document;
mod errors;
pub mod fsutil;
mod hashing;
mod notary;
mod pksign;
mod sealed;
mod security;
mod store;
mod tag;

#[cfg(test)]
pub mod testhelpers;

pub use always::*;
pub use certificate::{Certificate, Credentials, validate_certificate_chain};
pub use contract::Contract;
pub use controller::Controller;
pub use document::{Citation, Document, Versioned, canonical_bytes};
pub use errors::{NotaryError, Result};
pub use hashing::{Digest, DigestAlgorithm};
pub use notary::Notary;
pub use pksign::{KeyPair, PublicKey, SecretKey, Signature, SignatureAlgorithm, verify_signature};
pub use sealed::{SealedStore, StorageKey};
pub use security::{Event, SecurityModule, SecurityState};
pub use store::{ConfigStore, FileStore, MemoryStore};
pub use tag::{EntropyError, Protocol, Tag, TagParseError, Timestamp, Version};
