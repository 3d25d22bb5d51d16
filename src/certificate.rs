//! Key certificates and proof-of-possession credentials.

use crate::document::{Citation, Versioned, canonical_bytes};
use crate::errors::{NotaryError, Result};
use crate::hashing::DigestAlgorithm;
use crate::pksign::{PublicKey, Signature, SignatureAlgorithm, verify_signature};
use crate::tag::{Protocol, Tag, Version};
use serde::{Deserialize, Serialize};

/// Binds a [Tag] and [Version] to a public key, chained to the certificate it supersedes.
///
/// The first certificate in a chain is signed by its own key. Every later certificate is signed
/// by the key of the certificate it cites in `previous`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// Key lineage (same as the notary account tag).
    pub tag: Tag,
    /// Position in the chain, starting at `v1`.
    pub version: Version,
    /// Protocol version this certificate was issued under.
    pub protocol: Protocol,
    /// Digest algorithm used for citations under this certificate.
    pub digest_algorithm: DigestAlgorithm,
    /// Signature algorithm of `public_key`.
    pub signature_algorithm: SignatureAlgorithm,
    /// The certified public key.
    pub public_key: PublicKey,
    /// Citation of the superseded certificate (`None` for the first).
    pub previous: Option<Citation>,
    /// Signature over [Certificate::signable_bytes()].
    pub signature: Signature,
}

#[derive(Serialize)]
struct SignableCertificate<'a> {
    tag: &'a Tag,
    version: &'a Version,
    protocol: &'a Protocol,
    digest_algorithm: &'a DigestAlgorithm,
    signature_algorithm: &'a SignatureAlgorithm,
    public_key: &'a PublicKey,
    previous: &'a Option<Citation>,
}

impl Certificate {
    /// Build an unsigned certificate (the signature is all zeros until [Certificate::seal()]).
    pub(crate) fn unsigned(
        tag: Tag,
        version: Version,
        protocol: Protocol,
        digest_algorithm: DigestAlgorithm,
        public_key: PublicKey,
        previous: Option<Citation>,
    ) -> Self {
        Self {
            tag,
            version,
            protocol,
            digest_algorithm,
            signature_algorithm: SignatureAlgorithm::Ed25519,
            public_key,
            previous,
            signature: Signature::from_bytes([0; 64]),
        }
    }

    pub(crate) fn seal(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Canonical bytes of every field except the signature.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(&SignableCertificate {
            tag: &self.tag,
            version: &self.version,
            protocol: &self.protocol,
            digest_algorithm: &self.digest_algorithm,
            signature_algorithm: &self.signature_algorithm,
            public_key: &self.public_key,
            previous: &self.previous,
        })
    }

    /// Whether the signature verifies under `signer`.
    pub fn is_signed_by(&self, signer: &PublicKey) -> bool {
        match self.signable_bytes() {
            Ok(bytes) => verify_signature(signer, &self.signature, &bytes),
            Err(_) => false,
        }
    }

    /// Citation of this certificate.
    pub fn citation(&self) -> Result<Citation> {
        Citation::compute(self, self.protocol, self.digest_algorithm)
    }

    /// Check that this is a valid first certificate (`v1`, no previous, self-signed).
    pub fn validate_first(&self) -> Result<()> {
        if self.version != Version::FIRST {
            return Err(NotaryError::Validation(format!(
                "first certificate must be {}; got {}",
                Version::FIRST,
                self.version
            )));
        }
        if self.previous.is_some() {
            return Err(NotaryError::Validation(
                "first certificate cannot cite a previous certificate".to_string(),
            ));
        }
        if !self.is_signed_by(&self.public_key) {
            return Err(NotaryError::Validation(
                "first certificate is not self-signed".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that this certificate validly supersedes `previous`.
    pub fn validate_successor_of(&self, previous: &Certificate) -> Result<()> {
        if self.tag != previous.tag {
            return Err(NotaryError::Validation(format!(
                "certificate tag {} does not match previous tag {}",
                self.tag, previous.tag
            )));
        }
        let expected = previous.version.next().ok_or_else(|| {
            NotaryError::Validation(format!(
                "certificate {} has no successor version",
                previous.version
            ))
        })?;
        if self.version != expected {
            return Err(NotaryError::Validation(format!(
                "certificate {} does not follow {}",
                self.version, previous.version
            )));
        }
        if self.previous != Some(previous.citation()?) {
            return Err(NotaryError::Validation(format!(
                "certificate {} does not cite certificate {}",
                self.version, previous.version
            )));
        }
        if !self.is_signed_by(&previous.public_key) {
            return Err(NotaryError::Validation(format!(
                "certificate {} is not signed by the key of certificate {}",
                self.version, previous.version
            )));
        }
        Ok(())
    }
}

impl Versioned for Certificate {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// Walk a certificate chain from its first certificate, checking every link.
pub fn validate_certificate_chain(chain: &[Certificate]) -> Result<()> {
    let (first, rest) = chain
        .split_first()
        .ok_or_else(|| NotaryError::Validation("empty certificate chain".to_string()))?;
    first.validate_first()?;
    let mut previous = first;
    for certificate in rest {
        certificate.validate_successor_of(previous)?;
        previous = certificate;
    }
    Ok(())
}

/// Short lived, signed proof of possession of the current private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Fresh random tag for this set of credentials.
    pub tag: Tag,
    /// Always `v1`.
    pub version: Version,
    /// Caller supplied salt (normally a challenge from the relying party).
    pub salt: Tag,
    /// Citation of the certificate whose key signed these credentials.
    pub certificate: Citation,
    /// Signature over [Credentials::signable_bytes()].
    pub signature: Signature,
}

#[derive(Serialize)]
struct SignableCredentials<'a> {
    tag: &'a Tag,
    version: &'a Version,
    salt: &'a Tag,
    certificate: &'a Citation,
}

impl Credentials {
    pub(crate) fn unsigned(tag: Tag, salt: Tag, certificate: Citation) -> Self {
        Self {
            tag,
            version: Version::FIRST,
            salt,
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
        canonical_bytes(&SignableCredentials {
            tag: &self.tag,
            version: &self.version,
            salt: &self.salt,
            certificate: &self.certificate,
        })
    }

    /// Check these credentials against `certificate` and the expected `salt`.
    pub fn validate(&self, certificate: &Certificate, salt: &Tag) -> Result<()> {
        if &self.salt != salt {
            return Err(NotaryError::Validation("credentials salt mismatch".to_string()));
        }
        if self.certificate != certificate.citation()? {
            return Err(NotaryError::Validation(
                "credentials do not cite this certificate".to_string(),
            ));
        }
        let bytes = self.signable_bytes()?;
        if !verify_signature(&certificate.public_key, &self.signature, &bytes) {
            return Err(NotaryError::Validation(
                "credentials signature is invalid".to_string(),
            ));
        }
        Ok(())
    }
}

impl Versioned for Credentials {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn version(&self) -> Version {
        self.version
    }
}
