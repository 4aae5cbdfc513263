//! Engine configuration.
//!
//! Every threshold, weight and interval is a tunable default. The whole tree
//! deserializes from TOML with missing keys falling back to `Default`:
//!
//! ```toml
//! [vitals]
//! history_cap = 100
//!
//! [health]
//! hungry_after_days = 5.0
//!
//! [evolution.thresholds]
//! baby = 80
//!
//! [scheduler]
//! interval_secs = 3600
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tamagotchi_state::{EventTag, EvolutionStage};

use crate::domain::{PetError, Result};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TamagotchiConfig {
    pub vitals: VitalsConfig,
    pub health: HealthRules,
    pub evolution: EvolutionConfig,
    pub scheduler: SchedulerConfig,
}

impl TamagotchiConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: TamagotchiConfig =
            toml::from_str(raw).map_err(|e| PetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PetError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        self.vitals.validate()?;
        self.evolution.thresholds.validate()?;
        if self.evolution.neglect_cycles == 0 {
            return Err(PetError::Config(
                "evolution.neglect_cycles must be at least 1".to_string(),
            ));
        }
        self.scheduler.validate()
    }
}

/// Inclusive bounds of a vital statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

impl Bounds {
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Vital statistic bounds, starting values and history size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub happiness: Bounds,
    pub hunger: Bounds,
    pub initial_happiness: i32,
    pub initial_hunger: i32,
    /// Maximum number of events kept per pet
    pub history_cap: usize,
    /// Happiness at or above which an uneventful cycle reads as happy
    pub happy_mood_at: i32,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            happiness: Bounds { min: 0, max: 100 },
            hunger: Bounds { min: 0, max: 100 },
            initial_happiness: 50,
            initial_hunger: 0,
            history_cap: 50,
            happy_mood_at: 80,
        }
    }
}

impl VitalsConfig {
    fn validate(&self) -> Result<()> {
        for (name, bounds) in [("happiness", self.happiness), ("hunger", self.hunger)] {
            if bounds.min >= bounds.max {
                return Err(PetError::Config(format!(
                    "vitals.{name}: min ({}) must be below max ({})",
                    bounds.min, bounds.max
                )));
            }
        }
        if !self.happiness.contains(self.initial_happiness) {
            return Err(PetError::Config(
                "vitals.initial_happiness is outside its bounds".to_string(),
            ));
        }
        if !self.hunger.contains(self.initial_hunger) {
            return Err(PetError::Config(
                "vitals.initial_hunger is outside its bounds".to_string(),
            ));
        }
        if self.history_cap == 0 {
            return Err(PetError::Config(
                "vitals.history_cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Thresholds and step sizes of the health rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthRules {
    /// Commit staleness (days) beyond which the pet gets hungry
    pub hungry_after_days: f64,
    /// Oldest open PR age (hours) beyond which the pet worries
    pub worried_after_pr_hours: f64,
    /// Oldest unanswered issue age (days) beyond which the pet is lonely
    pub lonely_after_issue_days: f64,
    pub hunger_step: i32,
    pub worried_penalty: i32,
    pub lonely_penalty: i32,
    pub ci_success_bonus: i32,
    pub ci_failure_penalty: i32,
    pub sick_penalty: i32,
    /// Maximum hunger removed by one feeding
    pub feed_hunger_relief: i32,
    pub feed_happiness_bonus: i32,
}

impl Default for HealthRules {
    fn default() -> Self {
        Self {
            hungry_after_days: 3.0,
            worried_after_pr_hours: 48.0,
            lonely_after_issue_days: 7.0,
            hunger_step: 10,
            worried_penalty: 5,
            lonely_penalty: 5,
            ci_success_bonus: 5,
            ci_failure_penalty: 5,
            sick_penalty: 5,
            feed_hunger_relief: 100,
            feed_happiness_bonus: 10,
        }
    }
}

/// Growth score needed to leave each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageThresholds {
    pub egg: u32,
    pub baby: u32,
    pub child: u32,
    pub teen: u32,
    pub adult: u32,
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            egg: 10,
            baby: 50,
            child: 150,
            teen: 500,
            adult: 1500,
        }
    }
}

impl StageThresholds {
    /// Threshold for advancing out of `stage`; `None` when it cannot advance.
    pub fn for_stage(&self, stage: EvolutionStage) -> Option<u32> {
        match stage {
            EvolutionStage::Egg => Some(self.egg),
            EvolutionStage::Baby => Some(self.baby),
            EvolutionStage::Child => Some(self.child),
            EvolutionStage::Teen => Some(self.teen),
            EvolutionStage::Adult => Some(self.adult),
            EvolutionStage::Elder | EvolutionStage::Dormant => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let ladder = [self.egg, self.baby, self.child, self.teen, self.adult];
        if ladder[0] == 0 {
            return Err(PetError::Config(
                "evolution.thresholds.egg must be positive".to_string(),
            ));
        }
        if ladder.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PetError::Config(format!(
                "evolution.thresholds must be strictly increasing, got {ladder:?}"
            )));
        }
        Ok(())
    }
}

/// Growth score contributed by each event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthWeights {
    pub fed_and_grew: u32,
    pub happy_dance: u32,
}

impl Default for GrowthWeights {
    fn default() -> Self {
        Self {
            fed_and_grew: 10,
            happy_dance: 5,
        }
    }
}

impl GrowthWeights {
    pub fn weight(&self, tag: EventTag) -> u32 {
        match tag {
            EventTag::FedAndGrew => self.fed_and_grew,
            EventTag::HappyDance => self.happy_dance,
            EventTag::Hungry
            | EventTag::Worried
            | EventTag::Lonely
            | EventTag::Sick => 0,
        }
    }
}

/// Evolution state machine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub thresholds: StageThresholds,
    pub weights: GrowthWeights,
    /// Consecutive sick cycles at the happiness floor before going dormant
    pub neglect_cycles: u32,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            thresholds: StageThresholds::default(),
            weights: GrowthWeights::default(),
            neglect_cycles: 5,
        }
    }
}

/// Refresh scheduler timing, all durations in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    /// First retry delay after a source failure, doubled per further failure
    pub retry_base_secs: u64,
    pub backoff_ceiling_secs: u64,
    /// Consecutive source failures that switch a pet to degraded polling
    pub degraded_threshold: u32,
    pub degraded_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            retry_base_secs: 60,
            backoff_ceiling_secs: 60 * 60,
            degraded_threshold: 5,
            degraded_interval_secs: 4 * 60 * 60,
            fetch_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.backoff_ceiling_secs)
    }

    pub fn degraded_interval(&self) -> Duration {
        Duration::from_secs(self.degraded_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        let named = [
            ("interval_secs", self.interval_secs),
            ("retry_base_secs", self.retry_base_secs),
            ("backoff_ceiling_secs", self.backoff_ceiling_secs),
            ("degraded_interval_secs", self.degraded_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
        ];
        if let Some((name, _)) = named.iter().find(|(_, v)| *v == 0) {
            return Err(PetError::Config(format!("scheduler.{name} must be positive")));
        }
        if self.degraded_threshold == 0 {
            return Err(PetError::Config(
                "scheduler.degraded_threshold must be at least 1".to_string(),
            ));
        }
        if self.backoff_ceiling_secs < self.retry_base_secs {
            return Err(PetError::Config(
                "scheduler.backoff_ceiling_secs must not be below retry_base_secs".to_string(),
            ));
        }
        Ok(())
    }
}
