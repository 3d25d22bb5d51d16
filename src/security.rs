//! Gated key lifecycle: digest, sign, verify, generate, rotate and erase.
//!
//! A [SecurityModule] owns one [Controller] over [SecurityState] × [Event]:
//!
//! | from \ event | GenerateKeys | SignBytes | RotateKeys |
//! |--------------|--------------|-----------|------------|
//! | Keyless      | LoneKey      | -         | -          |
//! | LoneKey      | -            | LoneKey   | TwoKeys    |
//! | TwoKeys      | -            | LoneKey   | -          |
//!
//! Every gated operation works on a copy of the module state, persists that copy with exactly one
//! [ConfigStore::store()] call, and only then swaps it in. A failed write leaves the in-memory
//! state exactly as it was. [SecurityModule::erase_keys()] sits outside the table and always
//! clears memory before touching the store.

use crate::controller::Controller;
use crate::errors::{NotaryError, Result};
use crate::hashing::{Digest, DigestAlgorithm};
use crate::pksign::{KeyPair, PublicKey, SecretKey, Signature, SignatureAlgorithm, verify_signature};
use crate::store::ConfigStore;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use zeroize::{Zeroize, Zeroizing};

/// Key material state of a [SecurityModule].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityState {
    /// No key pair exists.
    Keyless,
    /// Exactly one key pair exists.
    LoneKey,
    /// A new key pair exists and the previous private key is retained for one more signature.
    TwoKeys,
}

/// Events gated by the [SecurityModule] controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// [SecurityModule::generate_keys()]
    GenerateKeys,
    /// [SecurityModule::sign_bytes()]
    SignBytes,
    /// [SecurityModule::rotate_keys()]
    RotateKeys,
}

static EVENTS: [Event; 3] = [Event::GenerateKeys, Event::SignBytes, Event::RotateKeys];

static STATES: [SecurityState; 3] = [
    SecurityState::Keyless,
    SecurityState::LoneKey,
    SecurityState::TwoKeys,
];

static TABLE: [[Option<SecurityState>; 3]; 3] = [
    [Some(SecurityState::LoneKey), None, None],
    [None, Some(SecurityState::LoneKey), Some(SecurityState::TwoKeys)],
    [None, Some(SecurityState::LoneKey), None],
];

fn new_controller() -> Result<Controller<SecurityState, Event>> {
    Controller::new(&EVENTS, &STATES, &TABLE)
}

#[derive(Clone)]
struct ModuleState {
    tag: Option<Tag>,
    controller: Controller<SecurityState, Event>,
    current: Option<KeyPair>,
    previous: Option<SecretKey>,
}

impl ModuleState {
    fn new() -> Result<Self> {
        Ok(Self {
            tag: None,
            controller: new_controller()?,
            current: None,
            previous: None,
        })
    }

    fn state(&self) -> SecurityState {
        // Transitions are only applied after is_valid(), so the dead state is unreachable.
        self.controller
            .get_state()
            .unwrap_or(SecurityState::Keyless)
    }

    fn check(&self, event: Event) -> Result<()> {
        if self.controller.is_valid(event) {
            Ok(())
        } else {
            Err(NotaryError::IllegalState {
                event,
                state: self.controller.get_state(),
            })
        }
    }

    fn current(&self, event: Event) -> Result<&KeyPair> {
        self.current.as_ref().ok_or(NotaryError::IllegalState {
            event,
            state: self.controller.get_state(),
        })
    }

    fn erase(&mut self) {
        if let Some(pair) = self.current.take() {
            pair.into_secret_key().zeroize();
        }
        if let Some(mut previous) = self.previous.take() {
            previous.zeroize();
        }
        self.tag = None;
        self.controller.reset_state();
    }
}

/// The unit of persistence.
#[derive(Serialize, Deserialize)]
struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<Tag>,
    state: SecurityState,
    digest_algorithm: DigestAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key: Option<SecretKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous_key: Option<SecretKey>,
}

impl Configuration {
    fn capture(state: &ModuleState, digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            tag: state.tag,
            state: state.state(),
            digest_algorithm,
            public_key: state.current.as_ref().map(|pair| pair.public_key()),
            private_key: state.current.as_ref().map(|pair| pair.secret_key().clone()),
            previous_key: state.previous.clone(),
        }
    }

    fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(serde_json::to_vec(self)?))
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        serde_json::from_slice(buf)
            .map_err(|err| NotaryError::Construction(format!("malformed configuration: {err}")))
    }

    fn restore(self, digest_algorithm: DigestAlgorithm) -> Result<ModuleState> {
        if self.digest_algorithm != digest_algorithm {
            return Err(NotaryError::Construction(format!(
                "configuration uses {:?}; module was opened with {:?}",
                self.digest_algorithm, digest_algorithm
            )));
        }
        let Configuration {
            tag,
            state,
            public_key,
            private_key,
            previous_key,
            ..
        } = self;
        let consistent = match state {
            SecurityState::Keyless => {
                public_key.is_none() && private_key.is_none() && previous_key.is_none()
            }
            SecurityState::LoneKey => {
                tag.is_some() && private_key.is_some() && previous_key.is_none()
            }
            SecurityState::TwoKeys => {
                tag.is_some() && private_key.is_some() && previous_key.is_some()
            }
        };
        if !consistent {
            return Err(NotaryError::Construction(format!(
                "configuration key material is inconsistent with state {state:?}"
            )));
        }
        let current = private_key.map(KeyPair::new);
        if let Some(pair) = &current {
            if public_key != Some(pair.public_key()) {
                return Err(NotaryError::Construction(
                    "configuration public key does not match private key".to_string(),
                ));
            }
        }
        let mut controller = new_controller()?;
        controller.restore_state(state)?;
        Ok(ModuleState {
            tag: if state == SecurityState::Keyless { None } else { tag },
            controller,
            current,
            previous: previous_key,
        })
    }
}

/// Performs gated cryptographic key lifecycle operations and persists every change.
pub struct SecurityModule {
    digest: DigestAlgorithm,
    store: Box<dyn ConfigStore>,
    state: Mutex<ModuleState>,
}

impl SecurityModule {
    /// Open a SHA-512 module over `store`, restoring any persisted configuration.
    pub fn open<S: ConfigStore + 'static>(store: S) -> Result<Self> {
        Self::open_with(store, DigestAlgorithm::default())
    }

    /// Open a module over `store` that digests with `digest`.
    ///
    /// If the store holds a configuration, the tag, state and keys are restored from it. A store
    /// that fails to load is a [NotaryError::Persistence]; a payload that does not decode or that
    /// breaks the key state invariants is a [NotaryError::Construction].
    pub fn open_with<S: ConfigStore + 'static>(store: S, digest: DigestAlgorithm) -> Result<Self> {
        let store: Box<dyn ConfigStore> = Box::new(store);
        let state = if store.exists()? {
            let buf = Zeroizing::new(store.load()?);
            let state = Configuration::from_bytes(&buf)?.restore(digest)?;
            tracing::debug!(tag = ?state.tag, state = ?state.state(), "restored security module");
            state
        } else {
            ModuleState::new()?
        };
        Ok(Self {
            digest,
            store,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ModuleState> {
        // State is only swapped in after a successful persist, so a poisoned guard is consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, guard: &mut MutexGuard<'_, ModuleState>, next: ModuleState) -> Result<()> {
        let buf = Configuration::capture(&next, self.digest).to_bytes()?;
        if let Err(err) = self.store.store(&buf) {
            tracing::warn!(
                state = ?guard.state(),
                attempted = ?next.state(),
                "configuration write failed, rolling back: {err}"
            );
            return Err(err.into());
        }
        **guard = next;
        Ok(())
    }

    /// Current key material state.
    pub fn state(&self) -> SecurityState {
        self.lock().state()
    }

    /// Tag of the current key lineage (`None` while keyless).
    pub fn tag(&self) -> Option<Tag> {
        self.lock().tag
    }

    /// The current public key (`None` while keyless).
    pub fn public_key(&self) -> Option<PublicKey> {
        self.lock().current.as_ref().map(|pair| pair.public_key())
    }

    /// Public half of the retained previous key (`Some` only in `TwoKeys`).
    pub fn previous_public_key(&self) -> Option<PublicKey> {
        self.lock().previous.as_ref().map(|key| key.public_key())
    }

    /// The digest algorithm this module was opened with.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    /// The signature algorithm of every key this module generates.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    /// Digest `bytes` with the module's digest algorithm. Needs no key material.
    pub fn digest_bytes(&self, bytes: &[u8]) -> Digest {
        self.digest.digest(bytes)
    }

    /// Verify `signature` over `bytes` under `public_key`. Never touches module state.
    pub fn is_valid(&self, public_key: &PublicKey, signature: &Signature, bytes: &[u8]) -> bool {
        verify_signature(public_key, signature, bytes)
    }

    /// Generate the first key pair and a fresh tag (`Keyless` → `LoneKey`).
    pub fn generate_keys(&self) -> Result<PublicKey> {
        let mut guard = self.lock();
        guard.check(Event::GenerateKeys)?;
        let mut next = guard.clone();
        let pair = KeyPair::generate()?;
        let public = pair.public_key();
        let tag = Tag::generate()?;
        next.tag = Some(tag);
        next.current = Some(pair);
        next.previous = None;
        next.controller.transition_state(Event::GenerateKeys);
        self.commit(&mut guard, next)?;
        tracing::info!(%tag, "generated keys");
        Ok(public)
    }

    /// Sign `bytes`.
    ///
    /// In `TwoKeys` the retained previous key makes this one signature and is then discarded,
    /// returning the module to `LoneKey`. Otherwise the current key signs.
    pub fn sign_bytes(&self, bytes: &[u8]) -> Result<Signature> {
        let mut guard = self.lock();
        guard.check(Event::SignBytes)?;
        let mut next = guard.clone();
        let (signature, used_previous) = match next.previous.take() {
            Some(mut previous) => {
                let signature = previous.sign(bytes);
                previous.zeroize();
                (signature, true)
            }
            None => (next.current(Event::SignBytes)?.sign(bytes), false),
        };
        next.controller.transition_state(Event::SignBytes);
        self.commit(&mut guard, next)?;
        tracing::debug!(tag = ?guard.tag, used_previous, "signed {} bytes", bytes.len());
        Ok(signature)
    }

    /// Replace the current key pair with a new one, retaining the old private key for one
    /// signature (`LoneKey` → `TwoKeys`). Returns the new public key.
    pub fn rotate_keys(&self) -> Result<PublicKey> {
        let mut guard = self.lock();
        guard.check(Event::RotateKeys)?;
        let mut next = guard.clone();
        let old = next
            .current
            .take()
            .ok_or(NotaryError::IllegalState {
                event: Event::RotateKeys,
                state: guard.controller.get_state(),
            })?;
        let pair = KeyPair::generate()?;
        let public = pair.public_key();
        next.previous = Some(old.into_secret_key());
        next.current = Some(pair);
        next.controller.transition_state(Event::RotateKeys);
        self.commit(&mut guard, next)?;
        tracing::info!(tag = ?guard.tag, "rotated keys");
        Ok(public)
    }

    /// Erase all key material and delete the persisted configuration.
    ///
    /// Always legal. Memory is wiped and the state forced to `Keyless` before the store is
    /// touched, so a failed delete is reported only after the keys are already gone.
    pub fn erase_keys(&self) -> Result<()> {
        let mut guard = self.lock();
        let tag = guard.tag;
        guard.erase();
        tracing::info!(?tag, "erased keys");
        if let Err(err) = self.store.delete() {
            tracing::warn!(?tag, "configuration delete failed after erasing keys: {err}");
            return Err(err.into());
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn has_previous_key(&self) -> bool {
        self.lock().previous.is_some()
    }
}

impl core::fmt::Debug for SecurityModule {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let guard = self.lock();
        f.debug_struct("SecurityModule")
            .field("digest", &self.digest)
            .field("tag", &guard.tag)
            .field("state", &guard.state())
            .finish_non_exhaustive()
    }
}
