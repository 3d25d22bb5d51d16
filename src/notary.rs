//! Certificate issuance and rotation, and document notarization, on top of [SecurityModule].
//!
//! A [Notary] holds one security module per protocol version, newest first. Signing always uses
//! the newest module. Older modules are only consulted to pick the digest algorithm when
//! verifying contracts and citations made under their protocol version.

use crate::always::PROTOCOL;
use crate::certificate::{Certificate, Credentials, validate_certificate_chain};
use crate::contract::Contract;
use crate::document::{Citation, Document, Versioned};
use crate::errors::{NotaryError, Result};
use crate::fsutil::config_filename;
use crate::hashing::DigestAlgorithm;
use crate::sealed::{SealedStore, StorageKey};
use crate::security::{Event, SecurityModule, SecurityState};
use crate::store::FileStore;
use crate::tag::{Protocol, Tag, Version};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Active {
    certificate: Certificate,
    citation: Citation,
}

/// Issues, rotates and retires certificates, and notarizes documents.
pub struct Notary {
    modules: Vec<(Protocol, SecurityModule)>,
    active: Mutex<Option<Active>>,
}

impl Notary {
    /// Build a notary from `(protocol, module)` pairs in any order.
    ///
    /// The module with the highest protocol version signs. Fails with
    /// [NotaryError::Construction] if `modules` is empty or names a protocol version twice.
    pub fn new(mut modules: Vec<(Protocol, SecurityModule)>) -> Result<Self> {
        if modules.is_empty() {
            return Err(NotaryError::Construction(
                "notary needs at least one security module".to_string(),
            ));
        }
        modules.sort_by(|a, b| b.0.cmp(&a.0));
        if let Some(pair) = modules.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(NotaryError::Construction(format!(
                "duplicate security module for protocol {}",
                pair[0].0
            )));
        }
        Ok(Self {
            modules,
            active: Mutex::new(None),
        })
    }

    /// Open a notary for the current protocol with its configuration stored in `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let store = FileStore::new(&config_filename(dir, PROTOCOL));
        Self::new(vec![(PROTOCOL, SecurityModule::open(store)?)])
    }

    /// Like [Notary::open()], but the configuration file is sealed under `key`.
    pub fn open_sealed(dir: &Path, key: StorageKey) -> Result<Self> {
        let store = SealedStore::new(FileStore::new(&config_filename(dir, PROTOCOL)), key);
        Self::new(vec![(PROTOCOL, SecurityModule::open(store)?)])
    }

    fn lock(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> (Protocol, &SecurityModule) {
        let (protocol, module) = &self.modules[0];
        (*protocol, module)
    }

    /// The protocol version new certificates and contracts are made under.
    pub fn current_protocol(&self) -> Protocol {
        self.modules[0].0
    }

    /// Every supported protocol version, newest first.
    pub fn protocols(&self) -> Vec<Protocol> {
        self.modules.iter().map(|(protocol, _)| *protocol).collect()
    }

    /// The security module registered for `protocol`.
    pub fn security_module(&self, protocol: Protocol) -> Option<&SecurityModule> {
        self.modules
            .iter()
            .find(|(p, _)| *p == protocol)
            .map(|(_, module)| module)
    }

    fn digest_algorithm(&self, protocol: Protocol) -> Result<DigestAlgorithm> {
        self.security_module(protocol)
            .map(|module| module.digest_algorithm())
            .ok_or(NotaryError::UnknownProtocol(protocol))
    }

    /// Tag of the notary account (`None` while keyless).
    pub fn account(&self) -> Option<Tag> {
        self.current().1.tag()
    }

    fn account_tag(module: &SecurityModule, event: Event) -> Result<Tag> {
        module.tag().ok_or(NotaryError::IllegalState {
            event,
            state: Some(SecurityState::Keyless),
        })
    }

    /// Generate the first key and return its self-signed `v1` certificate.
    ///
    /// The certificate is not activated; pass it to [Notary::activate_key()].
    pub fn generate_key(&self) -> Result<Certificate> {
        let _guard = self.lock();
        let (protocol, module) = self.current();
        if module.state() != SecurityState::Keyless {
            return Err(NotaryError::AlreadyKeyed);
        }
        let public_key = module.generate_keys()?;
        let tag = Self::account_tag(module, Event::GenerateKeys)?;
        let certificate = Certificate::unsigned(
            tag,
            Version::FIRST,
            protocol,
            module.digest_algorithm(),
            public_key,
            None,
        );
        let signature = module.sign_bytes(&certificate.signable_bytes()?)?;
        tracing::info!(%tag, %protocol, "generated first certificate");
        Ok(certificate.seal(signature))
    }

    // The certificate must certify this notary's key (or, mid-rotation, the key being rotated
    // out) under the current protocol.
    fn check_certifies(&self, certificate: &Certificate) -> Result<()> {
        let (protocol, module) = self.current();
        if certificate.protocol != protocol {
            return Err(NotaryError::Validation(format!(
                "certificate protocol {} is not the current protocol {}",
                certificate.protocol, protocol
            )));
        }
        if certificate.digest_algorithm != module.digest_algorithm() {
            return Err(NotaryError::Validation(format!(
                "certificate digest algorithm {:?} does not match {:?}",
                certificate.digest_algorithm,
                module.digest_algorithm()
            )));
        }
        if module.tag() != Some(certificate.tag) {
            return Err(NotaryError::Validation(format!(
                "certificate tag {} is not this notary's account",
                certificate.tag
            )));
        }
        let key = Some(certificate.public_key);
        if module.public_key() != key && module.previous_public_key() != key {
            return Err(NotaryError::Validation(format!(
                "certificate {} public key does not match the notary's key",
                certificate.version
            )));
        }
        Ok(())
    }

    fn set_active(
        guard: &mut MutexGuard<'_, Option<Active>>,
        certificate: &Certificate,
        citation: Citation,
    ) {
        **guard = Some(Active {
            certificate: certificate.clone(),
            citation,
        });
        tracing::info!(
            tag = %certificate.tag,
            version = %certificate.version,
            "activated certificate"
        );
    }

    /// Trust `certificate` as the one certifying the current key and return its citation.
    ///
    /// The certificate must certify this notary's key under the current protocol. A `v1`
    /// certificate must be correctly self-signed. Any later certificate must cite the active
    /// certificate and be signed by its key; activating the active certificate again is a no-op.
    /// With nothing active (after reopening, say) use [Notary::activate_chain()] instead.
    ///
    /// While a rotation is pending the certificate of the previous key is also accepted, so that
    /// [Notary::refresh_key()] can finish the rotation.
    pub fn activate_key(&self, certificate: &Certificate) -> Result<Citation> {
        let mut guard = self.lock();
        self.check_certifies(certificate)?;
        let citation = certificate.citation()?;
        match &certificate.previous {
            None => certificate.validate_first()?,
            Some(previous) => match guard.as_ref() {
                Some(active) if active.citation == citation => return Ok(citation),
                Some(active) if &active.citation == previous => {
                    certificate.validate_successor_of(&active.certificate)?
                }
                _ => {
                    return Err(NotaryError::Validation(format!(
                        "certificate {} does not cite the active certificate",
                        certificate.version
                    )));
                }
            },
        }
        Self::set_active(&mut guard, certificate, citation);
        Ok(citation)
    }

    /// Validate `chain` from its first certificate and activate its last one.
    ///
    /// This is how a notary reopened after one or more key refreshes trusts its latest
    /// certificate again.
    pub fn activate_chain(&self, chain: &[Certificate]) -> Result<Citation> {
        let mut guard = self.lock();
        let certificate = chain.last().ok_or_else(|| {
            NotaryError::Validation("certificate chain is empty".to_string())
        })?;
        self.check_certifies(certificate)?;
        validate_certificate_chain(chain)?;
        let citation = certificate.citation()?;
        Self::set_active(&mut guard, certificate, citation);
        Ok(citation)
    }

    /// Citation of the active certificate.
    pub fn get_citation(&self) -> Result<Citation> {
        self.lock()
            .as_ref()
            .map(|active| active.citation)
            .ok_or(NotaryError::NotActivated)
    }

    /// The active certificate.
    pub fn active_certificate(&self) -> Result<Certificate> {
        self.lock()
            .as_ref()
            .map(|active| active.certificate.clone())
            .ok_or(NotaryError::NotActivated)
    }

    /// Rotate to a new key and return its certificate, signed by the previous key.
    ///
    /// The new certificate cites the active one and becomes active itself. If the security module
    /// is already holding two keys (a rotation that was interrupted before the previous key
    /// signed), that rotation is finished instead of starting another.
    pub fn refresh_key(&self) -> Result<Certificate> {
        let mut guard = self.lock();
        let active = guard.as_ref().ok_or(NotaryError::NotActivated)?.clone();
        let (protocol, module) = self.current();
        let old_key = Some(active.certificate.public_key);
        let version = active.certificate.version.next().ok_or_else(|| {
            NotaryError::Validation(format!(
                "certificate {} has no successor version",
                active.certificate.version
            ))
        })?;
        let public_key = match module.state() {
            SecurityState::Keyless => {
                return Err(NotaryError::IllegalState {
                    event: Event::RotateKeys,
                    state: Some(SecurityState::Keyless),
                });
            }
            SecurityState::LoneKey => {
                if module.public_key() != old_key {
                    return Err(NotaryError::Validation(
                        "active certificate does not certify the current key".to_string(),
                    ));
                }
                module.rotate_keys()?
            }
            SecurityState::TwoKeys => {
                if module.previous_public_key() != old_key {
                    return Err(NotaryError::Validation(
                        "active certificate does not certify the key being rotated out".to_string(),
                    ));
                }
                tracing::info!(
                    tag = %active.certificate.tag,
                    "resuming interrupted key rotation"
                );
                module
                    .public_key()
                    .ok_or(NotaryError::IllegalState {
                        event: Event::SignBytes,
                        state: Some(SecurityState::TwoKeys),
                    })?
            }
        };
        let certificate = Certificate::unsigned(
            active.certificate.tag,
            version,
            protocol,
            module.digest_algorithm(),
            public_key,
            Some(active.citation),
        );
        let signature = module.sign_bytes(&certificate.signable_bytes()?)?;
        let certificate = certificate.seal(signature);
        let citation = certificate.citation()?;
        *guard = Some(Active {
            certificate: certificate.clone(),
            citation,
        });
        tracing::info!(
            tag = %certificate.tag,
            version = %certificate.version,
            "refreshed key"
        );
        Ok(certificate)
    }

    /// Erase the current key and forget the active certificate.
    pub fn forget_key(&self) -> Result<()> {
        let mut guard = self.lock();
        *guard = None;
        self.current().1.erase_keys()
    }

    fn ready<'a>(&self, active: &'a Option<Active>) -> Result<&'a Active> {
        let active = active.as_ref().ok_or(NotaryError::NotActivated)?;
        let module = self.current().1;
        if module.state() == SecurityState::TwoKeys {
            return Err(NotaryError::RotationPending);
        }
        if module.public_key() != Some(active.certificate.public_key) {
            return Err(NotaryError::Validation(
                "active certificate does not certify the current key".to_string(),
            ));
        }
        Ok(active)
    }

    /// Sign fresh credentials over `salt` with the current key.
    pub fn generate_credentials(&self, salt: Tag) -> Result<Credentials> {
        let guard = self.lock();
        let active = self.ready(&guard)?;
        let module = self.current().1;
        let credentials = Credentials::unsigned(Tag::generate()?, salt, active.citation);
        let signature = module.sign_bytes(&credentials.signable_bytes()?)?;
        tracing::debug!(tag = %credentials.tag, "generated credentials");
        Ok(credentials.seal(signature))
    }

    /// Wrap `document` in a [Contract] signed by the current key.
    pub fn notarize_document(&self, document: &Document) -> Result<Contract> {
        let guard = self.lock();
        let active = self.ready(&guard)?;
        let (protocol, module) = self.current();
        let account = Self::account_tag(module, Event::SignBytes)?;
        let digest = module.digest_bytes(&document.canonical_bytes()?);
        let contract = Contract::unsigned(
            document.clone(),
            digest,
            account,
            protocol,
            active.citation,
        );
        let signature = module.sign_bytes(&contract.signable_bytes()?)?;
        tracing::debug!(
            document = %document.tag,
            version = %document.version,
            "notarized document"
        );
        Ok(contract.seal(signature))
    }

    /// Check `contract` against the `certificate` it cites, reporting the first failed check.
    pub fn validate_contract(&self, contract: &Contract, certificate: &Certificate) -> Result<()> {
        let algorithm = self.digest_algorithm(contract.protocol)?;
        contract
            .validate(certificate, algorithm)
            .inspect_err(|err| tracing::warn!(document = %contract.document.tag, "{err}"))
    }

    /// Whether `contract` is valid under `certificate`.
    pub fn is_valid(&self, contract: &Contract, certificate: &Certificate) -> bool {
        self.validate_contract(contract, certificate).is_ok()
    }

    /// Cite `document` under the current protocol.
    pub fn cite_document<D: Versioned + ?Sized>(&self, document: &D) -> Result<Citation> {
        let (protocol, module) = self.current();
        Citation::compute(document, protocol, module.digest_algorithm())
    }

    /// Whether `citation` names exactly `document`.
    ///
    /// A mismatch is reported as `false`, never as an error.
    pub fn citation_matches<D: Versioned + ?Sized>(&self, citation: &Citation, document: &D) -> bool {
        match self.digest_algorithm(citation.protocol) {
            Ok(algorithm) => citation.matches(document, algorithm),
            Err(_) => false,
        }
    }

    /// Check a certificate chain starting from its first certificate.
    pub fn validate_certificate_chain(&self, chain: &[Certificate]) -> Result<()> {
        for certificate in chain {
            self.digest_algorithm(certificate.protocol)?;
        }
        validate_certificate_chain(chain)
    }

    /// Check `credentials` against `certificate` and the `salt` the relying party issued.
    pub fn validate_credentials(
        &self,
        credentials: &Credentials,
        certificate: &Certificate,
        salt: &Tag,
    ) -> Result<()> {
        self.digest_algorithm(certificate.protocol)?;
        credentials.validate(certificate, salt)
    }
}

impl core::fmt::Debug for Notary {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Notary")
            .field("protocols", &self.protocols())
            .field("account", &self.account())
            .finish_non_exhaustive()
    }
}
