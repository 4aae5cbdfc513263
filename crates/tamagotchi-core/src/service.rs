//! Inbound API: the operations a UI or CLI performs on pets.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tamagotchi_state::{
    EvolutionStage, PetEvent, PetId, PetMood, PetState, PetStateStore, RepoRef,
};
use tracing::info;

use crate::config::TamagotchiConfig;
use crate::domain::{PetError, Result};
use crate::evolution::{EvolutionEngine, StageProgress};
use crate::obs;
use crate::scheduler::{CycleOutcome, CycleTrigger, PollMode, RefreshScheduler};
use crate::source::MetricSource;

/// One line of the pet listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetSummary {
    pub id: PetId,
    pub repo: RepoRef,
    pub name: String,
    pub stage: EvolutionStage,
    pub mood: PetMood,
    pub happiness: i32,
    pub hunger: i32,
    pub sick: bool,
    pub version: u64,
    /// `None` when the pet is not scheduled in this process
    pub poll_mode: Option<PollMode>,
}

/// Pet operations over a store and a scheduler.
#[derive(Clone)]
pub struct PetService {
    store: Arc<dyn PetStateStore>,
    scheduler: RefreshScheduler,
    engine: EvolutionEngine,
}

impl PetService {
    pub fn new(
        store: Arc<dyn PetStateStore>,
        source: Arc<dyn MetricSource>,
        config: TamagotchiConfig,
    ) -> Self {
        let engine = EvolutionEngine::new(config.evolution.clone());
        let scheduler = RefreshScheduler::new(Arc::clone(&store), source, config);
        Self {
            store,
            scheduler,
            engine,
        }
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    fn config(&self) -> &TamagotchiConfig {
        self.scheduler.config()
    }

    /// Hatch a new pet for a repository and start polling it.
    ///
    /// The egg is not evaluated until its first scheduled cycle.
    pub async fn register_pet(&self, repo: RepoRef, name: Option<String>) -> Result<PetState> {
        let vitals = &self.config().vitals;
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| repo.name.clone());
        let egg = PetState::hatch(repo, name, vitals.initial_happiness, vitals.initial_hunger);
        let pet = self.store.create(egg).await?;
        self.scheduler.track(&pet.id);
        obs::emit_pet_registered(pet.id.as_str(), &pet.repo.to_string());
        Ok(pet)
    }

    pub async fn get_pet_state(&self, id: &PetId) -> Result<PetState> {
        Ok(self.store.load(id).await?)
    }

    /// The pet registered for a repository.
    pub async fn find_pet(&self, repo: &RepoRef) -> Result<PetState> {
        self.store
            .find_by_repo(repo)
            .await?
            .ok_or_else(|| PetError::NotFound(repo.to_string()))
    }

    /// Feed a pet as if a fresh commit had just been merged to main.
    pub async fn feed_pet(&self, id: &PetId) -> Result<PetState> {
        let outcome = self.scheduler.run_cycle(id, CycleTrigger::Feed).await?;
        Ok(outcome.state)
    }

    /// Fetch and apply a snapshot now instead of waiting for the timer.
    pub async fn refresh_pet(&self, id: &PetId) -> Result<CycleOutcome> {
        self.scheduler.run_cycle(id, CycleTrigger::ForceRefresh).await
    }

    /// Bring a dormant pet back as a baby.
    pub async fn revive_pet(&self, id: &PetId) -> Result<PetState> {
        let outcome = self.scheduler.run_cycle(id, CycleTrigger::Revive).await?;
        Ok(outcome.state)
    }

    /// Every stored pet, oldest first.
    pub async fn list_pets(&self) -> Result<Vec<PetSummary>> {
        let pets = self.store.list().await?;
        Ok(pets
            .into_iter()
            .map(|pet| PetSummary {
                poll_mode: self
                    .scheduler
                    .poll_status(&pet.id)
                    .filter(|s| s.tracked)
                    .map(|s| s.mode),
                id: pet.id,
                repo: pet.repo,
                name: pet.name,
                stage: pet.stage,
                mood: pet.mood,
                happiness: pet.happiness,
                hunger: pet.hunger,
                sick: pet.sick,
                version: pet.version,
            })
            .collect())
    }

    /// Recent events of a pet, oldest first.
    pub async fn get_pet_history(&self, id: &PetId) -> Result<Vec<PetEvent>> {
        Ok(self.store.load(id).await?.history())
    }

    /// Growth ladder position and age of a pet.
    pub async fn get_pet_progress(&self, id: &PetId) -> Result<StageProgress> {
        let pet = self.store.load(id).await?;
        Ok(self.engine.progress(&pet, Utc::now()))
    }

    /// Stop scheduling a pet. Its state stays in the store.
    pub async fn deregister_pet(&self, id: &PetId) -> Result<()> {
        self.store.load(id).await?;
        if self.scheduler.untrack(id) {
            obs::emit_pet_deregistered(id.as_str());
        }
        Ok(())
    }

    /// Track every stored pet, each due one interval after its last cycle.
    ///
    /// Returns the number of pets tracked.
    pub async fn resume(&self) -> Result<usize> {
        let pets = self.store.list().await?;
        let interval = self.config().scheduler.interval();
        let now = Utc::now();
        for pet in &pets {
            let since = pet
                .last_evaluated_at
                .and_then(|at| (now - at).to_std().ok())
                .unwrap_or(interval);
            let first_delay = interval.saturating_sub(since).max(Duration::from_secs(1));
            self.scheduler.track_after(&pet.id, first_delay);
        }
        info!(pets = pets.len(), "resumed polling");
        Ok(pets.len())
    }

    /// Stop all timers.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
