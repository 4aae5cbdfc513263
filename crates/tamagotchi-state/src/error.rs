//! Error types for tamagotchi-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a database backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::storage_traits::PetStateStore`] implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No pet stored under this id
    #[error("pet not found: {pet_id}")]
    NotFound { pet_id: String },

    /// A conditioned save or load saw a different version than expected
    #[error("version conflict for pet {pet_id}: expected {expected}, found {actual}")]
    VersionConflict {
        pet_id: String,
        expected: u64,
        actual: u64,
    },

    /// A pet already exists for the repository
    #[error("a pet already exists for repository {repo}")]
    AlreadyExists { repo: String },

    /// Repository reference is not `owner/name`
    #[error("invalid repository reference: {input} (expected owner/name)")]
    InvalidRepoRef { input: String },

    /// Backend failure (connection, query, encoding)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(format!("serialization: {err}"))
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
