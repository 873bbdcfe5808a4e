use std::path::PathBuf;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by a single user action on the deck.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Rejected locally; nothing was sent. `last_good` is the value the
    /// engine last reported, for the caller to redisplay.
    #[error("not a number: {input:?}")]
    InvalidNumber {
        input: String,
        last_good: Option<String>,
    },

    #[error("invalid preset name {name:?}: {reason}")]
    InvalidPresetName { name: String, reason: &'static str },

    #[error("{0} is busy")]
    Busy(String),

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("failed to persist client state to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DeckError>;
