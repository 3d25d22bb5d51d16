//! Notarized documents.

use crate::certificate::Certificate;
use crate::document::{Citation, Document, Versioned, canonical_bytes};
use crate::errors::{NotaryError, Result};
use crate::hashing::{Digest, DigestAlgorithm};
use crate::pksign::{Signature, verify_signature};
use crate::tag::{Protocol, Tag, Timestamp};
use serde::{Deserialize, Serialize};

/// A document wrapped with a notarization signature and a citation of the certifying certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// The notarized document.
    pub document: Document,
    /// Digest of the document's canonical bytes.
    pub digest: Digest,
    /// When the document was notarized.
    pub timestamp: Timestamp,
    /// Tag of the notary account that signed.
    pub account: Tag,
    /// Protocol version used to notarize.
    pub protocol: Protocol,
    /// Citation of the certificate whose key made `signature`.
    pub certificate: Citation,
    /// Signature over [Contract::signable_bytes()].
    pub signature: Signature,
}

#[derive(Serialize)]
struct SignableContract<'a> {
    document: &'a Document,
    digest: &'a Digest,
    timestamp: &'a Timestamp,
    account: &'a Tag,
    protocol: &'a Protocol,
    certificate: &'a Citation,
}

impl Contract {
    pub(crate) fn unsigned(
        document: Document,
        digest: Digest,
        account: Tag,
        protocol: Protocol,
        certificate: Citation,
    ) -> Self {
        Self {
            document,
            digest,
            timestamp: Timestamp::now(),
            account,
            protocol,
            certificate,
            signature: Signature::from_bytes([0; 64]),
        }
    }

    pub(crate) fn seal(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Canonical bytes of every field except the signature.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(&SignableContract {
            document: &self.document,
            digest: &self.digest,
            timestamp: &self.timestamp,
            account: &self.account,
            protocol: &self.protocol,
            certificate: &self.certificate,
        })
    }

    /// Check the document digest, the certificate citation and the signature.
    ///
    /// `algorithm` is the digest algorithm of the contract's protocol version.
    pub fn validate(&self, certificate: &Certificate, algorithm: DigestAlgorithm) -> Result<()> {
        let digest = algorithm.digest(&self.document.canonical_bytes()?);
        if digest != self.digest {
            return Err(NotaryError::Validation(format!(
                "digest of document {} does not match the contract",
                self.document.tag
            )));
        }
        if self.certificate != certificate.citation()? {
            return Err(NotaryError::Validation(format!(
                "contract cites certificate {} {}, not {} {}",
                self.certificate.tag,
                self.certificate.version,
                certificate.tag,
                certificate.version
            )));
        }
        let bytes = self.signable_bytes()?;
        if !verify_signature(&certificate.public_key, &self.signature, &bytes) {
            return Err(NotaryError::Validation(format!(
                "contract signature does not verify under certificate {}",
                certificate.version
            )));
        }
        Ok(())
    }
}
