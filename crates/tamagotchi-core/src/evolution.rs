//! Evolution state machine.
//!
//! Growth stages only move forward, one stage per cycle at most. Excess
//! growth carries over into the next stage. Sustained neglect (sick with
//! happiness at its floor) sends a pet to `Dormant`, which only an explicit
//! revive leaves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tamagotchi_state::{EventTag, EvolutionStage, PetState};

use crate::config::EvolutionConfig;

/// The evolution-relevant slice of a pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: EvolutionStage,
    pub growth_score: u32,
    pub neglect_streak: u32,
}

impl Progress {
    pub fn of(pet: &PetState) -> Self {
        Self {
            stage: pet.stage,
            growth_score: pet.growth_score,
            neglect_streak: pet.neglect_streak,
        }
    }
}

/// A stage change produced by one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: EvolutionStage,
    pub to: EvolutionStage,
}

/// Outcome of one evolution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evolution {
    pub progress: Progress,
    pub transition: Option<StageTransition>,
}

/// Where a pet stands on the growth ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: EvolutionStage,
    /// `None` when fully grown (Elder) or dormant
    pub next_stage: Option<EvolutionStage>,
    pub growth_score: u32,
    /// Growth needed to leave the current stage
    pub growth_needed: Option<u32>,
    /// Percent of the way to `next_stage`; 100 once fully grown
    pub percent: u8,
    /// Growth stages reached so far, the current one included
    pub stages_completed: Vec<EvolutionStage>,
    pub stages_remaining: Vec<EvolutionStage>,
    /// Whole days since the pet hatched
    pub age_days: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EvolutionEngine {
    config: EvolutionConfig,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionConfig) -> Self {
        Self { config }
    }

    /// Growth contributed by a set of events.
    pub fn growth_of(&self, events: &[EventTag]) -> u32 {
        events
            .iter()
            .fold(0u32, |acc, tag| acc.saturating_add(self.config.weights.weight(*tag)))
    }

    /// Advance `current` by one cycle.
    ///
    /// `sick` and `at_floor` describe the pet after the cycle's delta has
    /// been applied.
    pub fn evolve(
        &self,
        current: Progress,
        events: &[EventTag],
        sick: bool,
        at_floor: bool,
    ) -> Evolution {
        if current.stage.is_dormant() {
            return Evolution {
                progress: current,
                transition: None,
            };
        }

        let neglect_streak = if sick && at_floor {
            current.neglect_streak.saturating_add(1)
        } else {
            0
        };

        if neglect_streak >= self.config.neglect_cycles {
            return Evolution {
                progress: Progress {
                    stage: EvolutionStage::Dormant,
                    growth_score: 0,
                    neglect_streak: 0,
                },
                transition: Some(StageTransition {
                    from: current.stage,
                    to: EvolutionStage::Dormant,
                }),
            };
        }

        let mut progress = Progress {
            neglect_streak,
            ..current
        };

        // Elder is fully grown and accumulates nothing.
        let Some(threshold) = self.config.thresholds.for_stage(current.stage) else {
            return Evolution {
                progress,
                transition: None,
            };
        };

        progress.growth_score = progress.growth_score.saturating_add(self.growth_of(events));
        let mut transition = None;
        if progress.growth_score >= threshold {
            if let Some(next) = current.stage.successor() {
                progress.stage = next;
                progress.growth_score -= threshold;
                transition = Some(StageTransition {
                    from: current.stage,
                    to: next,
                });
            }
        }

        Evolution {
            progress,
            transition,
        }
    }

    /// Growth ladder position of `pet` as of `now`.
    ///
    /// A dormant pet has left the ladder: nothing is completed and every
    /// growth stage is still ahead of it.
    pub fn progress(&self, pet: &PetState, now: DateTime<Utc>) -> StageProgress {
        let age_days = (now - pet.created_at).num_days().max(0);
        let growth_needed = self.config.thresholds.for_stage(pet.stage);
        let next_stage = pet.stage.successor();

        let (stages_completed, stages_remaining) = match pet.stage.growth_rank() {
            Some(rank) => {
                let (done, ahead) = EvolutionStage::GROWTH.split_at(usize::from(rank) + 1);
                (done.to_vec(), ahead.to_vec())
            }
            None => (Vec::new(), EvolutionStage::GROWTH.to_vec()),
        };

        let percent = match (growth_needed, next_stage) {
            (Some(needed), Some(_)) if needed > 0 => {
                let pct = u64::from(pet.growth_score) * 100 / u64::from(needed);
                pct.min(100) as u8
            }
            (_, Some(_)) => 100,
            (_, None) if pet.stage.is_dormant() => 0,
            (_, None) => 100,
        };

        StageProgress {
            stage: pet.stage,
            next_stage,
            growth_score: pet.growth_score,
            growth_needed,
            percent,
            stages_completed,
            stages_remaining,
            age_days,
        }
    }

    /// Progress of a revived pet: back to a fresh baby.
    pub fn revive(&self) -> Progress {
        Progress {
            stage: EvolutionStage::Baby,
            growth_score: 0,
            neglect_streak: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(stage: EvolutionStage, growth_score: u32) -> Progress {
        Progress {
            stage,
            growth_score,
            neglect_streak: 0,
        }
    }

    #[test]
    fn crossing_threshold_advances_with_carry_over() {
        let engine = EvolutionEngine::default();
        let out = engine.evolve(
            at(EvolutionStage::Baby, 45),
            &[EventTag::FedAndGrew],
            false,
            false,
        );
        assert_eq!(out.progress.stage, EvolutionStage::Child);
        assert_eq!(out.progress.growth_score, 5);
        assert_eq!(
            out.transition,
            Some(StageTransition {
                from: EvolutionStage::Baby,
                to: EvolutionStage::Child
            })
        );
    }

    #[test]
    fn overshoot_advances_one_stage_only() {
        let engine = EvolutionEngine::default();
        let out = engine.evolve(at(EvolutionStage::Egg, 400), &[], false, false);
        assert_eq!(out.progress.stage, EvolutionStage::Baby);
        assert_eq!(out.progress.growth_score, 390);
    }

    #[test]
    fn negative_events_do_not_grow() {
        let engine = EvolutionEngine::default();
        let out = engine.evolve(
            at(EvolutionStage::Child, 3),
            &[EventTag::Hungry, EventTag::Worried, EventTag::Sick],
            false,
            false,
        );
        assert_eq!(out.progress, at(EvolutionStage::Child, 3));
        assert_eq!(out.transition, None);
    }

    #[test]
    fn elder_stops_growing() {
        let engine = EvolutionEngine::default();
        let out = engine.evolve(
            at(EvolutionStage::Elder, 0),
            &[EventTag::FedAndGrew, EventTag::HappyDance],
            false,
            false,
        );
        assert_eq!(out.progress, at(EvolutionStage::Elder, 0));
        assert_eq!(out.transition, None);
    }

    #[test]
    fn sustained_neglect_goes_dormant() {
        let engine = EvolutionEngine::default();
        let mut progress = at(EvolutionStage::Teen, 120);
        for cycle in 1..5 {
            let out = engine.evolve(progress, &[EventTag::Sick], true, true);
            assert_eq!(out.transition, None, "cycle {cycle}");
            assert_eq!(out.progress.neglect_streak, cycle);
            progress = out.progress;
        }
        let out = engine.evolve(progress, &[EventTag::Sick], true, true);
        assert_eq!(out.progress.stage, EvolutionStage::Dormant);
        assert_eq!(out.progress.growth_score, 0);
        assert_eq!(
            out.transition.map(|t| t.from),
            Some(EvolutionStage::Teen)
        );
    }

    #[test]
    fn recovery_resets_neglect_streak() {
        let engine = EvolutionEngine::default();
        let progress = Progress {
            neglect_streak: 4,
            ..at(EvolutionStage::Child, 0)
        };
        let out = engine.evolve(progress, &[], true, false);
        assert_eq!(out.progress.neglect_streak, 0);
        assert_eq!(out.progress.stage, EvolutionStage::Child);
    }

    #[test]
    fn dormant_is_frozen() {
        let engine = EvolutionEngine::default();
        let dormant = at(EvolutionStage::Dormant, 0);
        let out = engine.evolve(dormant, &[EventTag::FedAndGrew; 3], false, false);
        assert_eq!(out.progress, dormant);
        assert_eq!(out.transition, None);
    }

    fn pet_at(stage: EvolutionStage, growth_score: u32) -> PetState {
        let mut pet = PetState::hatch(tamagotchi_state::RepoRef::new("octo", "cat"), "cat", 50, 0);
        pet.stage = stage;
        pet.growth_score = growth_score;
        pet
    }

    #[test]
    fn progress_within_a_stage() {
        let engine = EvolutionEngine::default();
        let pet = pet_at(EvolutionStage::Baby, 20);
        let progress = engine.progress(&pet, pet.created_at + chrono::Duration::days(3));
        assert_eq!(progress.next_stage, Some(EvolutionStage::Child));
        assert_eq!(progress.growth_needed, Some(50));
        assert_eq!(progress.percent, 40);
        assert_eq!(
            progress.stages_completed,
            vec![EvolutionStage::Egg, EvolutionStage::Baby]
        );
        assert_eq!(progress.stages_remaining.len(), 4);
        assert_eq!(progress.age_days, 3);
    }

    #[test]
    fn progress_at_stage_boundaries() {
        let engine = EvolutionEngine::default();
        let fresh = pet_at(EvolutionStage::Egg, 0);
        let progress = engine.progress(&fresh, fresh.created_at);
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.stages_completed, vec![EvolutionStage::Egg]);
        assert_eq!(progress.age_days, 0);

        let almost = pet_at(EvolutionStage::Adult, 1499);
        assert_eq!(engine.progress(&almost, almost.created_at).percent, 99);

        // Carry-over beyond the threshold is capped until the next cycle.
        let overshoot = pet_at(EvolutionStage::Baby, 390);
        assert_eq!(engine.progress(&overshoot, overshoot.created_at).percent, 100);
    }

    #[test]
    fn elder_has_no_next_stage() {
        let engine = EvolutionEngine::default();
        let elder = pet_at(EvolutionStage::Elder, 0);
        let progress = engine.progress(&elder, elder.created_at);
        assert_eq!(progress.next_stage, None);
        assert_eq!(progress.growth_needed, None);
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.stages_completed.len(), 6);
        assert!(progress.stages_remaining.is_empty());
    }

    #[test]
    fn dormant_progress_is_off_the_ladder() {
        let engine = EvolutionEngine::default();
        let dormant = pet_at(EvolutionStage::Dormant, 0);
        let progress = engine.progress(&dormant, dormant.created_at);
        assert_eq!(progress.next_stage, None);
        assert_eq!(progress.percent, 0);
        assert!(progress.stages_completed.is_empty());
        assert_eq!(progress.stages_remaining, EvolutionStage::GROWTH.to_vec());
    }

    #[test]
    fn revive_returns_a_fresh_baby() {
        let progress = EvolutionEngine::default().revive();
        assert_eq!(progress, at(EvolutionStage::Baby, 0));
    }
}
