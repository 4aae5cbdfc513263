//! Storage trait definitions for pet state
//!
//! `PetStateStore` is the persistence seam of the engine: a key-value store
//! keyed by pet id with optimistic versioning. It is async and
//! backend-agnostic; an in-memory fake lives in the `fakes` module and a
//! SurrealDB implementation in `surreal_store`.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::pet::{PetId, PetState, RepoRef};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Versioned pet state store.
///
/// Guarantees:
/// - `create` stores the pet at version 1; at most one pet per repository.
/// - `save(state)` succeeds only if the stored version equals `state.version`,
///   and persists the state at `state.version + 1` atomically.
/// - A failed `save` leaves the stored state untouched.
#[async_trait]
pub trait PetStateStore: Send + Sync {
    /// Insert a new pet. Fails with `AlreadyExists` if the repository is taken.
    async fn create(&self, state: PetState) -> StorageResult<PetState>;

    /// Load a pet by id. Returns `StorageError::NotFound` if absent.
    async fn load(&self, id: &PetId) -> StorageResult<PetState>;

    /// Look up the pet registered for a repository, if any.
    async fn find_by_repo(&self, repo: &RepoRef) -> StorageResult<Option<PetState>>;

    /// Save conditioned on version match, returning the state as stored.
    async fn save(&self, state: PetState) -> StorageResult<PetState>;

    /// All pets, oldest registration first.
    async fn list(&self) -> StorageResult<Vec<PetState>>;

    /// Load a pet and, when `expected_version` is given, require that version.
    async fn load_at(&self, id: &PetId, expected_version: Option<u64>) -> StorageResult<PetState> {
        let state = self.load(id).await?;
        match expected_version {
            Some(expected) if expected != state.version => Err(StorageError::VersionConflict {
                pet_id: id.to_string(),
                expected,
                actual: state.version,
            }),
            _ => Ok(state),
        }
    }
}
