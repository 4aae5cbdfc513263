//! SurrealDB-backed PetStateStore implementation
//!
//! Uses `schema::PetRecord` for persistence, converting to/from `PetState`
//! at the boundary. The version-conditioned save is a single
//! `UPDATE ... WHERE version = $expected` statement, so it is atomic with
//! respect to other writers on the same database.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::pet::{PetId, PetState, RepoRef};
use crate::schema::PetRecord;
use crate::storage_traits::{PetStateStore, StorageResult};

/// SurrealDB-backed implementation of [`PetStateStore`].
#[derive(Clone)]
pub struct SurrealPetStore {
    db: Surreal<Any>,
}

impl SurrealPetStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `tamagotchi/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://").await
    }

    /// Open (or create) an on-disk database under `path`.
    pub async fn local(path: &str) -> crate::Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        Self::connect(&format!("surrealkv://{}", path)).await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("tamagotchi")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealPetStore connected ({})", url);
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_row(&self, pet_id: &str) -> StorageResult<Option<PetRecord>> {
        let pid = pet_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM pets WHERE pet_id = $pid")
            .bind(("pid", pid))
            .await?;
        let rows: Vec<PetRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl PetStateStore for SurrealPetStore {
    async fn create(&self, mut state: PetState) -> StorageResult<PetState> {
        if self.find_by_repo(&state.repo).await?.is_some() {
            return Err(StorageError::AlreadyExists {
                repo: state.repo.to_string(),
            });
        }

        state.version = 1;
        let row = PetRecord::from_state(&state)?;
        debug!(pet_id = %state.id, repo = %state.repo, "creating pet");

        let created: StorageResult<Option<PetRecord>> = self
            .db
            .create("pets")
            .content(row)
            .await
            .map_err(StorageError::from);

        match created {
            Ok(_) => Ok(state),
            // Lost a race against another registration of the same repository
            Err(StorageError::Backend(msg)) if msg.contains("idx_repo_key") => {
                Err(StorageError::AlreadyExists {
                    repo: state.repo.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn load(&self, id: &PetId) -> StorageResult<PetState> {
        self.fetch_row(id.as_str())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                pet_id: id.to_string(),
            })?
            .into_state()
    }

    async fn find_by_repo(&self, repo: &RepoRef) -> StorageResult<Option<PetState>> {
        let key = repo.key();
        let mut res = self
            .db
            .query("SELECT * FROM pets WHERE repo_key = $key")
            .bind(("key", key))
            .await?;
        let rows: Vec<PetRecord> = res.take(0)?;
        rows.into_iter().next().map(PetRecord::into_state).transpose()
    }

    async fn save(&self, mut state: PetState) -> StorageResult<PetState> {
        let expected = state.version;
        state.version = expected + 1;
        let row = PetRecord::from_state(&state)?;
        let pid = state.id.to_string();

        let updated: surrealdb::Result<Vec<PetRecord>> = async {
            self.db
                .query(
                    "UPDATE pets SET version = $next, state_json = $state_json, updated_at = time::now() \
                     WHERE pet_id = $pid AND version = $expected RETURN AFTER",
                )
                .bind(("next", row.version))
                .bind(("state_json", row.state_json))
                .bind(("pid", pid.clone()))
                .bind(("expected", expected))
                .await?
                .take(0)
        }
        .await;

        let lost_race = match updated {
            Ok(rows) => rows.is_empty(),
            // A concurrent writer committed first and the engine aborted ours
            Err(e) if is_write_conflict(&e) => {
                debug!(pet_id = %pid, error = %e, "save aborted by a concurrent write");
                true
            }
            Err(e) => return Err(e.into()),
        };

        if lost_race {
            return match self.fetch_row(&pid).await? {
                None => Err(StorageError::NotFound { pet_id: pid }),
                Some(current) => Err(StorageError::VersionConflict {
                    pet_id: pid,
                    expected,
                    actual: current.version,
                }),
            };
        }

        debug!(pet_id = %state.id, version = state.version, "pet saved");
        Ok(state)
    }

    async fn list(&self) -> StorageResult<Vec<PetState>> {
        let mut res = self
            .db
            .query("SELECT * FROM pets ORDER BY created_at ASC")
            .await?;
        let rows: Vec<PetRecord> = res.take(0)?;
        rows.into_iter().map(PetRecord::into_state).collect()
    }
}

/// Transaction aborted because another transaction touched the same record.
///
/// The embedded engines report this as a retryable commit failure
/// ("read or write conflict ... can be retried"); the error carries no
/// stable variant across engines, so the message is matched.
fn is_write_conflict(err: &surrealdb::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("conflict") && !msg.contains("idx_repo_key")
}
