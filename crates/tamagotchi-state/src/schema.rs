//! Schema definitions for the SurrealDB `pets` table
//!
//! A row carries the lookup columns (`pet_id`, `repo_key`, `version`) next to
//! the full `PetState` encoded as JSON. The conditioned update in
//! `surreal_store` only ever compares the `version` column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::pet::PetState;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Pet row in the `pets` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetRecord {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Pet id (UUID string, unique)
    pub pet_id: String,
    /// Lowercase `owner/name` (unique)
    pub repo_key: String,
    /// Optimistic concurrency counter, mirrors `PetState::version`
    pub version: u64,
    /// Full `PetState` as JSON
    pub state_json: String,
    /// Registration timestamp, used for listing order
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PetRecord {
    /// Encode a state into a row
    pub fn from_state(state: &PetState) -> Result<Self, StorageError> {
        Ok(PetRecord {
            id: None,
            pet_id: state.id.to_string(),
            repo_key: state.repo.key(),
            version: state.version,
            state_json: serde_json::to_string(state)?,
            created_at: state.created_at,
        })
    }

    /// Decode the row back into a state. The `version` column wins over the
    /// embedded copy.
    pub fn into_state(self) -> Result<PetState, StorageError> {
        let mut state: PetState = serde_json::from_str(&self.state_json)?;
        state.version = self.version;
        Ok(state)
    }
}
