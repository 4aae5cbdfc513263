//! Health evaluation: metric snapshot + current pet → health delta.
//!
//! The evaluator is a pure function of its inputs. Unknown observations
//! contribute nothing; every rule that fires adds to the delta and appends
//! its event tag. Clamping happens when the delta is applied.

use tamagotchi_state::{CiStatus, EventTag, PetMood, PetState};

use crate::config::HealthRules;
use crate::domain::{HealthDelta, MetricSnapshot, Observation};

/// Applies the configured health rules to snapshots.
#[derive(Debug, Clone, Default)]
pub struct HealthEvaluator {
    rules: HealthRules,
}

impl HealthEvaluator {
    pub fn new(rules: HealthRules) -> Self {
        Self { rules }
    }

    /// Compute the delta a snapshot implies for `current`.
    pub fn evaluate(&self, current: &PetState, snapshot: &MetricSnapshot) -> HealthDelta {
        let rules = &self.rules;
        let mut delta = HealthDelta::default();

        if let Observation::Known(days) = snapshot.days_since_last_commit {
            if days > rules.hungry_after_days {
                delta.hunger += rules.hunger_step;
                delta.push_event(EventTag::Hungry);
            }
        }

        if let Observation::Known(hours) = snapshot.oldest_open_pr_age_hours {
            if hours > rules.worried_after_pr_hours {
                delta.happiness -= rules.worried_penalty;
                delta.push_event(EventTag::Worried);
            }
        }

        if let Observation::Known(days) = snapshot.oldest_unanswered_issue_age_days {
            if days > rules.lonely_after_issue_days {
                delta.happiness -= rules.lonely_penalty;
                delta.push_event(EventTag::Lonely);
            }
        }

        // CI only counts on a change of the observed status.
        if snapshot.last_ci_status != CiStatus::Unknown {
            delta.ci_observed = Some(snapshot.last_ci_status);
            if snapshot.last_ci_status != current.last_ci_status {
                match snapshot.last_ci_status {
                    CiStatus::Success => {
                        delta.happiness += rules.ci_success_bonus;
                        delta.push_event(EventTag::HappyDance);
                    }
                    CiStatus::Failure => {
                        delta.happiness -= rules.ci_failure_penalty;
                        delta.push_event(EventTag::Worried);
                    }
                    CiStatus::Unknown => {}
                }
            }
        }

        if self.merged_to_main(snapshot) {
            delta.hunger -= current.hunger.clamp(0, rules.feed_hunger_relief.max(0));
            delta.happiness += rules.feed_happiness_bonus;
            delta.fed = true;
            delta.push_event(EventTag::FedAndGrew);
        }

        match snapshot.dependencies_stale {
            Observation::Known(true) => {
                if !current.sick {
                    delta.sickness = Some(true);
                }
                delta.happiness -= rules.sick_penalty;
                delta.push_event(EventTag::Sick);
            }
            Observation::Known(false) if current.sick => delta.sickness = Some(false),
            _ => {}
        }

        delta
    }

    /// A merge is a commit age that reset to zero together with the merged flag.
    fn merged_to_main(&self, snapshot: &MetricSnapshot) -> bool {
        matches!(
            (snapshot.days_since_last_commit, snapshot.merged_to_main),
            (Observation::Known(days), Observation::Known(true)) if days < 1.0
        )
    }
}

/// Mood shown for a cycle, by event priority.
///
/// sick > hungry > worried > lonely > dancing > happy; an uneventful cycle
/// reads as happy at or above `happy_at`, content otherwise.
pub fn derive_mood(events: &[EventTag], happiness: i32, happy_at: i32) -> PetMood {
    let priority = [
        (EventTag::Sick, PetMood::Sick),
        (EventTag::Hungry, PetMood::Hungry),
        (EventTag::Worried, PetMood::Worried),
        (EventTag::Lonely, PetMood::Lonely),
        (EventTag::HappyDance, PetMood::Dancing),
        (EventTag::FedAndGrew, PetMood::Happy),
    ];
    priority
        .iter()
        .find(|(tag, _)| events.contains(tag))
        .map(|(_, mood)| *mood)
        .unwrap_or(if happiness >= happy_at {
            PetMood::Happy
        } else {
            PetMood::Content
        })
}
