//! Documents, citations and the canonical notation used for digesting and signing.
//!
//! The canonical form of any value is its compact JSON serialization with every object's keys
//! written in sorted order, struct fields included. Keys are sorted here rather than relying on
//! the map type `serde_json` was built with, so the `preserve_order` feature changes nothing.

use crate::errors::{NotaryError, Result};
use crate::hashing::{Digest, DigestAlgorithm};
use crate::tag::{EntropyError, Protocol, Tag, Version};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// The canonical byte serialization of `value`.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&Sorted(&value))?)
}

// Writes a `Value` with object keys in sorted order.
struct Sorted<'a>(&'a Value);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Sorted(value))?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&Sorted(item))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

/// A document with a tag and version that can be cited.
pub trait Versioned: Serialize {
    /// Tag naming this document's lineage.
    fn tag(&self) -> Tag;

    /// Version of this document within its lineage.
    fn version(&self) -> Version;

    /// The canonical byte serialization of this document.
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(self)
    }
}

/// Content addressed pointer to exactly one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Tag of the cited document.
    pub tag: Tag,
    /// Version of the cited document.
    pub version: Version,
    /// Protocol version whose digest algorithm produced `digest`.
    pub protocol: Protocol,
    /// Digest of the cited document's canonical bytes.
    pub digest: Digest,
}

impl Citation {
    /// Cite `document` using `algorithm`.
    pub fn compute<D: Versioned + ?Sized>(
        document: &D,
        protocol: Protocol,
        algorithm: DigestAlgorithm,
    ) -> Result<Self> {
        let bytes = document.canonical_bytes()?;
        Ok(Self {
            tag: document.tag(),
            version: document.version(),
            protocol,
            digest: algorithm.digest(&bytes),
        })
    }

    /// Whether this citation names exactly `document` (tag, version and digest).
    ///
    /// Returns `false` on any mismatch, including a document that cannot be serialized.
    pub fn matches<D: Versioned + ?Sized>(&self, document: &D, algorithm: DigestAlgorithm) -> bool {
        match Citation::compute(document, self.protocol, algorithm) {
            Ok(other) => &other == self,
            Err(_) => false,
        }
    }
}

/// An arbitrary structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Tag naming this document's lineage.
    pub tag: Tag,
    /// Version within the lineage.
    pub version: Version,
    /// Citation of the previous version, if any.
    pub previous: Option<Citation>,
    /// The document body.
    pub content: serde_json::Value,
}

impl Document {
    /// A new first version document with a fresh random tag.
    pub fn new(content: serde_json::Value) -> std::result::Result<Self, EntropyError> {
        Ok(Self {
            tag: Tag::generate()?,
            version: Version::FIRST,
            previous: None,
            content,
        })
    }

    /// The next version of this document, citing `previous` (normally a citation of `self`).
    ///
    /// Fails with [NotaryError::Validation] if this is already the last representable version.
    pub fn successor(&self, previous: Citation, content: serde_json::Value) -> Result<Self> {
        let version = self.version.next().ok_or_else(|| {
            NotaryError::Validation(format!("document {} has no successor version", self.version))
        })?;
        Ok(Self {
            tag: self.tag,
            version,
            previous: Some(previous),
            content,
        })
    }
}

impl Versioned for Document {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn version(&self) -> Version {
        self.version
    }
}
