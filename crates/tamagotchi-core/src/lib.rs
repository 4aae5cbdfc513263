//! GitHub Tamagotchi core library
//!
//! Turns repository activity into the vitals and growth of a virtual pet:
//! - `evaluator`: snapshot + pet → health delta
//! - `evolution`: growth stages, neglect and revival
//! - `scheduler`: serialized, versioned refresh cycles per pet
//! - `service`: the inbound API used by the CLI

pub mod config;
pub mod cycle;
pub mod domain;
pub mod evaluator;
pub mod evolution;
pub mod metrics;
pub mod obs;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod telemetry;

pub use config::{
    Bounds, EvolutionConfig, GrowthWeights, HealthRules, SchedulerConfig, StageThresholds,
    TamagotchiConfig, VitalsConfig,
};
pub use cycle::{apply_cycle, revive_state, CycleReport};
pub use domain::{HealthDelta, MetricSnapshot, Observation, PetError, Result, SourceError};
pub use evaluator::{derive_mood, HealthEvaluator};
pub use evolution::{Evolution, EvolutionEngine, Progress, StageProgress, StageTransition};
pub use scheduler::{
    next_delay, poll_mode, CycleOutcome, CycleTrigger, PollMode, PollStatus, RefreshScheduler,
};
pub use service::{PetService, PetSummary};
pub use source::{MetricSource, Scripted, ScriptedSource};

pub use tamagotchi_state::{
    CiStatus, EventTag, EvolutionStage, PetEvent, PetId, PetMood, PetState, PetStateStore,
    RepoRef,
};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
