use thiserror::Error;

use crate::keysym::Keysym;

/// Failures surfaced by key resolution and keyboard sessions.
#[derive(Debug, Error)]
pub enum KeyboardError {
    /// A raw key string was neither a known key name nor a single character.
    #[error("key {0:?} must be a single character or a known key name")]
    InvalidKeyLength(String),

    /// A control character with no key equivalent.
    #[error("character {0:?} has no key equivalent")]
    UnsupportedKey(char),

    /// The keysym has no slot in the keyboard mapping and registration was not allowed.
    #[error("no such key {key:?} (keysym {keysym:#x})")]
    NoSuchKey { key: String, keysym: Keysym },

    /// Every dynamically registered slot is currently held down.
    #[error("no spare keycodes left to register keysym {0:#x}")]
    NoSpareSlots(Keysym),

    #[error("keyboard session is closed")]
    Closed,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl KeyboardError {
    /// Errors raised before the session touched any state.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            KeyboardError::InvalidKeyLength(_) | KeyboardError::UnsupportedKey(_)
        )
    }
}

pub type Result<T, E = KeyboardError> = std::result::Result<T, E>;
