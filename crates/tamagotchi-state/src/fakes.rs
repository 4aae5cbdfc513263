//! In-memory fakes for storage traits
//!
//! `MemoryPetStore` satisfies the `PetStateStore` contract without any
//! external dependencies. Besides tests it backs `--db mem` runs of the CLI.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::pet::{PetId, PetState, RepoRef};
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    pets: HashMap<PetId, PetState>,
    /// repo key -> pet id
    repos: HashMap<String, PetId>,
}

/// In-memory pet store backed by a `HashMap<PetId, PetState>`.
#[derive(Debug, Default)]
pub struct MemoryPetStore {
    tables: Mutex<Tables>,
}

impl MemoryPetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    /// Bump the stored version without changing anything else, as an
    /// external writer would.
    pub fn touch(&self, id: &PetId) -> StorageResult<u64> {
        let mut tables = self.tables()?;
        let state = tables
            .pets
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound {
                pet_id: id.to_string(),
            })?;
        state.version += 1;
        Ok(state.version)
    }

    /// Number of stored pets.
    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.pets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PetStateStore for MemoryPetStore {
    async fn create(&self, mut state: PetState) -> StorageResult<PetState> {
        let mut tables = self.tables()?;
        let key = state.repo.key();
        if tables.repos.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                repo: state.repo.to_string(),
            });
        }
        state.version = 1;
        tables.repos.insert(key, state.id.clone());
        tables.pets.insert(state.id.clone(), state.clone());
        Ok(state)
    }

    async fn load(&self, id: &PetId) -> StorageResult<PetState> {
        let tables = self.tables()?;
        tables
            .pets
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                pet_id: id.to_string(),
            })
    }

    async fn find_by_repo(&self, repo: &RepoRef) -> StorageResult<Option<PetState>> {
        let tables = self.tables()?;
        Ok(tables
            .repos
            .get(&repo.key())
            .and_then(|id| tables.pets.get(id))
            .cloned())
    }

    async fn save(&self, mut state: PetState) -> StorageResult<PetState> {
        let mut tables = self.tables()?;
        let stored = tables
            .pets
            .get_mut(&state.id)
            .ok_or_else(|| StorageError::NotFound {
                pet_id: state.id.to_string(),
            })?;
        if stored.version != state.version {
            return Err(StorageError::VersionConflict {
                pet_id: state.id.to_string(),
                expected: state.version,
                actual: stored.version,
            });
        }
        state.version += 1;
        *stored = state.clone();
        Ok(state)
    }

    async fn list(&self) -> StorageResult<Vec<PetState>> {
        let tables = self.tables()?;
        let mut pets: Vec<PetState> = tables.pets.values().cloned().collect();
        pets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pets)
    }
}
