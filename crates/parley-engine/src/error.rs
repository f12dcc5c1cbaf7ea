use parley_shared::{ConversationKey, InvalidPair, UserId};
use parley_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine to the transport layer.
///
/// `Validation`, `RecipientNotFound`, and `InvalidPair` are client errors;
/// `AnchorConflict` and `Store` are transient server errors.  Stale
/// presence unregisters are handled internally as no-ops and never appear
/// here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed message payload (missing content or media reference).
    #[error("Invalid message payload: {0}")]
    Validation(String),

    /// The receiver identity does not resolve in the identity store.
    #[error("Recipient not found: {0}")]
    RecipientNotFound(UserId),

    /// Sender and receiver are the same identity.
    #[error(transparent)]
    InvalidPair(#[from] InvalidPair),

    /// The per-conversation anchor could not be committed even after
    /// retries.  The caller may retry the whole send.
    #[error("Anchor conflict for conversation {0} after retries")]
    AnchorConflict(ConversationKey),

    /// Underlying datastore failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AnchorConflict(key) => Self::AnchorConflict(key),
            other => Self::Store(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
