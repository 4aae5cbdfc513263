//! SurrealDB schema migrations and initialization

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing tamagotchi SurrealDB schema");
    init_pets_table(db).await?;
    info!("Tamagotchi schema initialization complete");
    Ok(())
}

/// Initialize `pets` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE pets {
///   pet_id:      STRING (unique)
///   repo_key:    STRING (unique, lowercase owner/name)
///   version:     INT    (optimistic concurrency counter)
///   state_json:  STRING (encoded PetState)
///   created_at:  DATETIME (indexed)
///   updated_at:  DATETIME?
/// }
/// ```
///
/// Constraints:
/// - one row per pet id, one pet per repository
/// - `version` only changes through `UPDATE ... WHERE version = $expected`
async fn init_pets_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing pets table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS pets AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_pet_id ON TABLE pets COLUMNS pet_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_repo_key ON TABLE pets COLUMNS repo_key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE pets COLUMNS created_at;
    "#;

    db.query(sql).await?.check()?;
    info!("pets table initialized");
    Ok(())
}
