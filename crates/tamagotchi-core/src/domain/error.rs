//! Domain-level error taxonomy for the pet engine.

use tamagotchi_state::StorageError;

/// Why a metric source could not deliver a snapshot at all.
///
/// Partially missing data is not an error: it arrives as a snapshot with
/// unknown observations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("metric source unavailable: {0}")]
    Unavailable(String),

    #[error("metric fetch timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("metric source rate limited")]
    RateLimited,
}

/// Pet engine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PetError {
    /// The whole snapshot fetch failed; the cycle was aborted without mutation.
    #[error("source unavailable for {repo}: {source}")]
    SourceUnavailable {
        repo: String,
        #[source]
        source: SourceError,
    },

    /// The store kept changing underneath the cycle, even after one retry.
    #[error("version conflict for pet {pet_id} after retry")]
    VersionConflict { pet_id: String },

    #[error("pet not found: {0}")]
    NotFound(String),

    #[error("invalid action {action} on pet {pet_id}: {reason}")]
    InvalidAction {
        pet_id: String,
        action: &'static str,
        reason: String,
    },

    #[error("a pet is already registered for {0}")]
    AlreadyRegistered(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<StorageError> for PetError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { pet_id } => PetError::NotFound(pet_id),
            StorageError::VersionConflict { pet_id, .. } => PetError::VersionConflict { pet_id },
            StorageError::AlreadyExists { repo } => PetError::AlreadyRegistered(repo),
            other => PetError::Storage(other.to_string()),
        }
    }
}

/// Result type for pet engine operations.
pub type Result<T> = std::result::Result<T, PetError>;
