//! Domain models for the pet engine.
//!
//! - `MetricSnapshot`: one fetched set of repository measurements
//! - `HealthDelta`: the adjustment computed from a snapshot
//! - `PetError` / `SourceError`: the error taxonomy

pub mod delta;
pub mod error;
pub mod snapshot;

pub use delta::HealthDelta;
pub use error::{PetError, Result, SourceError};
pub use snapshot::{MetricSnapshot, Observation};
