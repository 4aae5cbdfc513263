//! Pet domain model
//!
//! A pet is the derived, persisted view of one repository's health:
//! - `PetState`: vitals, evolution progress and bounded event history
//! - `EvolutionStage`: ordered growth stages plus the terminal `Dormant`
//! - `PetEvent`: tagged, timestamped entries in the capped history

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Unique identifier of a pet (UUID v4 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PetId(pub String);

impl PetId {
    /// Generate a new random PetId
    pub fn new() -> Self {
        PetId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a GitHub repository (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Canonical lowercase key used for uniqueness checks.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name).to_ascii_lowercase()
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(RepoRef::new(owner, name))
            }
            _ => Err(StorageError::InvalidRepoRef {
                input: s.to_string(),
            }),
        }
    }
}

/// Evolution stage of a pet.
///
/// Growth order is Egg → Baby → Child → Teen → Adult → Elder. `Dormant` sits
/// outside that order: it is entered through neglect and left only by an
/// explicit revive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStage {
    Egg,
    Baby,
    Child,
    Teen,
    Adult,
    Elder,
    Dormant,
}

impl EvolutionStage {
    /// All growth stages in order (excludes `Dormant`).
    pub const GROWTH: [EvolutionStage; 6] = [
        EvolutionStage::Egg,
        EvolutionStage::Baby,
        EvolutionStage::Child,
        EvolutionStage::Teen,
        EvolutionStage::Adult,
        EvolutionStage::Elder,
    ];

    /// Position in the growth order, `None` for `Dormant`.
    pub fn growth_rank(self) -> Option<u8> {
        match self {
            EvolutionStage::Egg => Some(0),
            EvolutionStage::Baby => Some(1),
            EvolutionStage::Child => Some(2),
            EvolutionStage::Teen => Some(3),
            EvolutionStage::Adult => Some(4),
            EvolutionStage::Elder => Some(5),
            EvolutionStage::Dormant => None,
        }
    }

    /// Next growth stage. `None` for `Elder` (fully grown) and `Dormant`.
    pub fn successor(self) -> Option<EvolutionStage> {
        match self {
            EvolutionStage::Egg => Some(EvolutionStage::Baby),
            EvolutionStage::Baby => Some(EvolutionStage::Child),
            EvolutionStage::Child => Some(EvolutionStage::Teen),
            EvolutionStage::Teen => Some(EvolutionStage::Adult),
            EvolutionStage::Adult => Some(EvolutionStage::Elder),
            EvolutionStage::Elder | EvolutionStage::Dormant => None,
        }
    }

    pub fn is_dormant(self) -> bool {
        self == EvolutionStage::Dormant
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvolutionStage::Egg => "egg",
            EvolutionStage::Baby => "baby",
            EvolutionStage::Child => "child",
            EvolutionStage::Teen => "teen",
            EvolutionStage::Adult => "adult",
            EvolutionStage::Elder => "elder",
            EvolutionStage::Dormant => "dormant",
        }
    }
}

impl fmt::Display for EvolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent CI run on the default branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Success,
    Failure,
    #[default]
    Unknown,
}

/// Tags of the events a pet can experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    Hungry,
    Worried,
    Lonely,
    HappyDance,
    FedAndGrew,
    Sick,
}

impl EventTag {
    pub fn as_str(self) -> &'static str {
        match self {
            EventTag::Hungry => "hungry",
            EventTag::Worried => "worried",
            EventTag::Lonely => "lonely",
            EventTag::HappyDance => "happy_dance",
            EventTag::FedAndGrew => "fed_and_grew",
            EventTag::Sick => "sick",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a pet's event history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetEvent {
    pub tag: EventTag,
    pub at: DateTime<Utc>,
}

/// Displayed mood, derived from the latest evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetMood {
    Happy,
    #[default]
    Content,
    Hungry,
    Worried,
    Lonely,
    Sick,
    Dancing,
}

impl fmt::Display for PetMood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PetMood::Happy => "happy",
            PetMood::Content => "content",
            PetMood::Hungry => "hungry",
            PetMood::Worried => "worried",
            PetMood::Lonely => "lonely",
            PetMood::Sick => "sick",
            PetMood::Dancing => "dancing",
        };
        f.write_str(s)
    }
}

/// Persisted state of one pet.
///
/// `version` is owned by the store: 0 for a state that was never saved, 1
/// after `create`, and incremented by every conditioned `save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetState {
    pub id: PetId,
    pub repo: RepoRef,
    pub name: String,
    pub stage: EvolutionStage,
    pub happiness: i32,
    pub hunger: i32,
    pub sick: bool,
    pub mood: PetMood,
    /// Weighted positive events since the last stage change
    pub growth_score: u32,
    /// Consecutive cycles spent sick with happiness at its floor
    pub neglect_streak: u32,
    /// Last CI status actually observed (unknown readings do not overwrite it)
    pub last_ci_status: CiStatus,
    pub last_fed_at: Option<DateTime<Utc>>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
    /// Recent events, oldest first
    pub events: VecDeque<PetEvent>,
}

impl PetState {
    /// A freshly hatched egg with the given starting vitals.
    pub fn hatch(repo: RepoRef, name: impl Into<String>, happiness: i32, hunger: i32) -> Self {
        Self {
            id: PetId::new(),
            repo,
            name: name.into(),
            stage: EvolutionStage::Egg,
            happiness,
            hunger,
            sick: false,
            mood: PetMood::Content,
            growth_score: 0,
            neglect_streak: 0,
            last_ci_status: CiStatus::Unknown,
            last_fed_at: None,
            last_evaluated_at: None,
            created_at: Utc::now(),
            version: 0,
            events: VecDeque::new(),
        }
    }

    /// Append an event, dropping the oldest entries beyond `cap`.
    pub fn record_event(&mut self, event: PetEvent, cap: usize) {
        self.events.push_back(event);
        while self.events.len() > cap {
            self.events.pop_front();
        }
    }

    /// Event history as an ordered vector (oldest first).
    pub fn history(&self) -> Vec<PetEvent> {
        self.events.iter().cloned().collect()
    }
}
