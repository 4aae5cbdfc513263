//! One evaluation cycle applied to a pet, without I/O.
//!
//! `apply_cycle` folds a snapshot into a state: evaluate, clamp, record
//! events, derive mood, evolve. The version is left untouched; the store
//! owns it.

use serde::{Deserialize, Serialize};
use tamagotchi_state::{PetEvent, PetState};

use crate::config::VitalsConfig;
use crate::domain::{HealthDelta, MetricSnapshot};
use crate::evaluator::{derive_mood, HealthEvaluator};
use crate::evolution::{EvolutionEngine, Progress, StageTransition};

/// What one cycle did to a pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub delta: HealthDelta,
    pub transition: Option<StageTransition>,
}

/// Apply one snapshot to `current`, returning the next state.
pub fn apply_cycle(
    current: &PetState,
    snapshot: &MetricSnapshot,
    evaluator: &HealthEvaluator,
    engine: &EvolutionEngine,
    vitals: &VitalsConfig,
) -> (PetState, CycleReport) {
    let delta = evaluator.evaluate(current, snapshot);
    let mut next = current.clone();

    next.happiness = vitals
        .happiness
        .clamp(current.happiness.saturating_add(delta.happiness));
    next.hunger = vitals
        .hunger
        .clamp(current.hunger.saturating_add(delta.hunger));
    if let Some(sick) = delta.sickness {
        next.sick = sick;
    }
    if let Some(status) = delta.ci_observed {
        next.last_ci_status = status;
    }
    if delta.fed {
        next.last_fed_at = Some(snapshot.fetched_at);
    }
    for tag in &delta.events {
        next.record_event(
            PetEvent {
                tag: *tag,
                at: snapshot.fetched_at,
            },
            vitals.history_cap,
        );
    }
    next.mood = derive_mood(&delta.events, next.happiness, vitals.happy_mood_at);
    next.last_evaluated_at = Some(snapshot.fetched_at);

    let evolution = engine.evolve(
        Progress::of(current),
        &delta.events,
        next.sick,
        next.happiness <= vitals.happiness.min,
    );
    next.stage = evolution.progress.stage;
    next.growth_score = evolution.progress.growth_score;
    next.neglect_streak = evolution.progress.neglect_streak;

    (
        next,
        CycleReport {
            delta,
            transition: evolution.transition,
        },
    )
}

/// Reset a dormant pet to a fresh baby with neutral vitals.
pub fn revive_state(
    current: &PetState,
    engine: &EvolutionEngine,
    vitals: &VitalsConfig,
    at: chrono::DateTime<chrono::Utc>,
) -> (PetState, StageTransition) {
    let progress = engine.revive();
    let mut next = current.clone();
    next.stage = progress.stage;
    next.growth_score = progress.growth_score;
    next.neglect_streak = progress.neglect_streak;
    next.happiness = vitals.initial_happiness;
    next.hunger = vitals.initial_hunger;
    next.sick = false;
    next.mood = derive_mood(&[], next.happiness, vitals.happy_mood_at);
    next.last_evaluated_at = Some(at);
    (
        next,
        StageTransition {
            from: current.stage,
            to: progress.stage,
        },
    )
}
