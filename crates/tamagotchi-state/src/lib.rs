//! Tamagotchi-State: pet model and persistence for GitHub Tamagotchi
//!
//! This crate owns the data that survives between evaluation cycles: the
//! `PetState` of every registered repository and the versioned store that
//! holds it.
//!
//! ## Key Components
//!
//! - `PetState`, `EvolutionStage`, `PetEvent`: the persisted pet model
//! - `PetStateStore`: versioned key-value store keyed by pet id
//! - `MemoryPetStore`: in-memory implementation (tests, ephemeral runs)
//! - `SurrealPetStore`: SurrealDB implementation (`mem://` or `surrealkv://`)

mod error;
pub mod fakes;
pub mod migrations;
pub mod pet;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use fakes::MemoryPetStore;
pub use pet::{
    CiStatus, EventTag, EvolutionStage, PetEvent, PetId, PetMood, PetState, RepoRef,
};
pub use schema::PetRecord;
pub use storage_traits::{PetStateStore, StorageResult};
pub use surreal_store::SurrealPetStore;

/// Result type for backend setup operations
pub type Result<T> = std::result::Result<T, StateError>;
