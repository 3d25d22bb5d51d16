//! Errors, yo!

use crate::security::{Event, SecurityState};
use crate::tag::Protocol;
use std::io;
use thiserror::Error;

/// Everything that can go wrong in the notary, its security module and its controller.
#[derive(Debug, Error)]
pub enum NotaryError {
    /// A gated operation was attempted from a state with no valid transition for it.
    ///
    /// `state` is `None` only if the controller reached its dead state, which is a defect.
    #[error("illegal state: cannot {event:?} while {state:?}")]
    IllegalState {
        /// The attempted event.
        event: Event,
        /// The state the module was in.
        state: Option<SecurityState>,
    },

    /// The secure random source failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// An integrity or provenance check was attempted and failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The configuration store failed to load, store or delete.
    #[error("persistence failed: {0}")]
    Persistence(#[from] io::Error),

    /// Malformed controller table, or malformed tag/key material on restore.
    #[error("construction failed: {0}")]
    Construction(String),

    /// `generate_key()` called on a notary that already has keys.
    #[error("notary already has keys")]
    AlreadyKeyed,

    /// No certificate has been activated.
    #[error("no active certificate")]
    NotActivated,

    /// The security module holds two keys; the rotation must be finished first.
    #[error("key rotation pending, call refresh_key() to finish it")]
    RotationPending,

    /// No security module is registered for this protocol version.
    #[error("unknown protocol version {0}")]
    UnknownProtocol(Protocol),

    /// Canonical serialization failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl NotaryError {
    /// True if this is a gated operation attempted before any key exists.
    pub fn is_not_keyed(&self) -> bool {
        matches!(
            self,
            NotaryError::IllegalState {
                state: Some(SecurityState::Keyless),
                ..
            }
        )
    }

    /// True for [NotaryError::IllegalState].
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, NotaryError::IllegalState { .. })
    }
}

impl From<getrandom::Error> for NotaryError {
    fn from(err: getrandom::Error) -> Self {
        NotaryError::KeyGeneration(err.to_string())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, NotaryError>;
