//! Refresh scheduling: periodic and manual evaluation cycles per pet.
//!
//! Every cycle runs through the same pipeline:
//!
//! 1. take the pet's gate (a fair async mutex, so triggers queue FIFO)
//! 2. load the current state with its version
//! 3. obtain a snapshot (fetched under a timeout, or synthesised for a feed)
//! 4. evaluate, apply and evolve without I/O
//! 5. save conditioned on the loaded version, retrying once from a fresh
//!    load if another writer got there first
//!
//! A failed fetch aborts the cycle before anything is written and feeds the
//! pet's backoff counter. Timer tasks only interrupt their sleep on
//! cancellation; a cycle already in flight runs to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tamagotchi_state::{EvolutionStage, PetId, PetState, PetStateStore, StorageError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use crate::config::{SchedulerConfig, TamagotchiConfig};
use crate::cycle::{apply_cycle, revive_state, CycleReport};
use crate::domain::{HealthDelta, MetricSnapshot, PetError, Result, SourceError};
use crate::evaluator::HealthEvaluator;
use crate::evolution::{EvolutionEngine, StageTransition};
use crate::metrics::METRICS;
use crate::obs;
use crate::source::MetricSource;

/// Saves attempted per cycle: the first plus one retry after a conflict.
const MAX_SAVE_ATTEMPTS: u32 = 2;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    /// Timer tick
    Scheduled,
    /// User-requested immediate refresh
    ForceRefresh,
    /// Manual feed with a synthetic positive snapshot
    Feed,
    /// Explicit reset of a dormant pet
    Revive,
}

impl CycleTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleTrigger::Scheduled => "scheduled",
            CycleTrigger::ForceRefresh => "force_refresh",
            CycleTrigger::Feed => "feed",
            CycleTrigger::Revive => "revive",
        }
    }

    fn fetches(self) -> bool {
        matches!(self, CycleTrigger::Scheduled | CycleTrigger::ForceRefresh)
    }
}

/// Polling health of a pet's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    Normal,
    /// Retrying after recent source failures
    Backoff,
    /// Too many consecutive failures; polling at the slow interval
    Degraded,
}

/// Snapshot of a pet's polling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStatus {
    pub mode: PollMode,
    pub consecutive_failures: u32,
    pub next_delay: Duration,
    pub tracked: bool,
}

/// Result of a persisted cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: PetState,
    /// `None` for a revive, which applies no health delta
    pub delta: Option<HealthDelta>,
    pub transition: Option<StageTransition>,
    /// Save attempts used (1, or 2 after a version conflict)
    pub attempts: u32,
}

/// Polling mode after `failures` consecutive source failures.
pub fn poll_mode(failures: u32, config: &SchedulerConfig) -> PollMode {
    if failures == 0 {
        PollMode::Normal
    } else if failures >= config.degraded_threshold {
        PollMode::Degraded
    } else {
        PollMode::Backoff
    }
}

/// Delay before the next scheduled cycle after `failures` consecutive
/// source failures.
pub fn next_delay(failures: u32, config: &SchedulerConfig) -> Duration {
    match poll_mode(failures, config) {
        PollMode::Normal => config.interval(),
        PollMode::Backoff => {
            let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
            config
                .retry_base()
                .saturating_mul(factor)
                .min(config.backoff_ceiling())
        }
        PollMode::Degraded => config.degraded_interval(),
    }
}

/// Per-pet registry entry.
#[derive(Default)]
struct Slot {
    gate: Arc<tokio::sync::Mutex<()>>,
    failures: u32,
    timer: Option<Timer>,
}

struct Timer {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn PetStateStore>,
    source: Arc<dyn MetricSource>,
    config: TamagotchiConfig,
    evaluator: HealthEvaluator,
    engine: EvolutionEngine,
    slots: Mutex<HashMap<PetId, Slot>>,
}

/// Drives evaluation cycles for every tracked pet.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<dyn PetStateStore>,
        source: Arc<dyn MetricSource>,
        config: TamagotchiConfig,
    ) -> Self {
        let evaluator = HealthEvaluator::new(config.health.clone());
        let engine = EvolutionEngine::new(config.evolution.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                config,
                evaluator,
                engine,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &TamagotchiConfig {
        &self.inner.config
    }

    /// Start periodic cycles for a pet, first one after a full interval.
    pub fn track(&self, id: &PetId) {
        self.track_after(id, self.inner.config.scheduler.interval());
    }

    /// Start periodic cycles for a pet with a custom first delay.
    ///
    /// Tracking an already tracked pet is a no-op.
    pub fn track_after(&self, id: &PetId, first_delay: Duration) {
        let mut slots = self.slots();
        let slot = slots.entry(id.clone()).or_default();
        if slot.timer.is_some() {
            return;
        }
        let (cancel, rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            id.clone(),
            first_delay,
            rx,
        ));
        slot.timer = Some(Timer { cancel, task });
        debug!(pet_id = %id, delay_secs = first_delay.as_secs(), "pet tracked");
    }

    /// Stop periodic cycles for a pet. Returns whether it was tracked.
    ///
    /// Backoff state is discarded. The pet's gate stays registered while a
    /// cycle holds or waits on it, so a cycle in flight still excludes any
    /// cycle started afterwards.
    pub fn untrack(&self, id: &PetId) -> bool {
        let timer = {
            let mut slots = self.slots();
            let timer = slots.get_mut(id).and_then(|slot| {
                slot.failures = 0;
                slot.timer.take()
            });
            prune_idle(&mut slots, id);
            timer
        };
        match timer {
            Some(timer) => {
                let _ = timer.cancel.send(true);
                true
            }
            None => false,
        }
    }

    pub fn is_tracked(&self, id: &PetId) -> bool {
        self.slots()
            .get(id)
            .map(|slot| slot.timer.is_some())
            .unwrap_or(false)
    }

    /// Ids of all tracked pets, sorted.
    pub fn tracked(&self) -> Vec<PetId> {
        let mut ids: Vec<PetId> = self
            .slots()
            .iter()
            .filter(|(_, slot)| slot.timer.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Current polling state of a pet the scheduler has seen.
    pub fn poll_status(&self, id: &PetId) -> Option<PollStatus> {
        let slots = self.slots();
        let slot = slots.get(id)?;
        let cfg = &self.inner.config.scheduler;
        Some(PollStatus {
            mode: poll_mode(slot.failures, cfg),
            consecutive_failures: slot.failures,
            next_delay: next_delay(slot.failures, cfg),
            tracked: slot.timer.is_some(),
        })
    }

    /// Run one cycle for a pet now, waiting behind any cycle in progress.
    pub async fn run_cycle(&self, id: &PetId, trigger: CycleTrigger) -> Result<CycleOutcome> {
        self.inner
            .run_cycle(id, trigger)
            .instrument(obs::cycle_span(id.as_str(), trigger.as_str()))
            .await
    }

    /// Cancel every timer and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        let timers: Vec<Timer> = self
            .slots()
            .values_mut()
            .filter_map(|slot| slot.timer.take())
            .collect();
        for timer in &timers {
            let _ = timer.cancel.send(true);
        }
        for timer in timers {
            if let Err(e) = timer.task.await {
                warn!(error = %e, "poll task ended abnormally");
            }
        }
        METRICS.flush();
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PetId, Slot>> {
        self.inner.slots()
    }
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, HashMap<PetId, Slot>> {
        // The map holds no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn gate(&self, id: &PetId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.slots().entry(id.clone()).or_default().gate)
    }

    fn failures(&self, id: &PetId) -> u32 {
        self.slots().get(id).map(|slot| slot.failures).unwrap_or(0)
    }

    /// Drop the slot of an untracked, healthy pet once no cycle uses its gate.
    fn release(&self, id: &PetId) {
        prune_idle(&mut self.slots(), id);
    }

    // Called with the gate held, which keeps the slot in the map.
    fn record_failure(&self, id: &PetId, err: &SourceError) {
        let failures = {
            let mut slots = self.slots();
            match slots.get_mut(id) {
                Some(slot) => {
                    slot.failures = slot.failures.saturating_add(1);
                    slot.failures
                }
                None => 1,
            }
        };
        METRICS.inc_source_failures();
        obs::emit_source_failure(id.as_str(), failures, err);
        if failures == self.config.scheduler.degraded_threshold {
            obs::emit_degraded(id.as_str(), failures);
        }
    }

    fn record_success(&self, id: &PetId) {
        let previous = {
            let mut slots = self.slots();
            slots
                .get_mut(id)
                .map(|slot| std::mem::take(&mut slot.failures))
                .unwrap_or(0)
        };
        if previous > 0 {
            obs::emit_recovered(id.as_str(), previous);
        }
    }

    async fn fetch(&self, state: &PetState) -> Result<MetricSnapshot> {
        let cfg = &self.config.scheduler;
        let fetched = tokio::time::timeout(
            cfg.fetch_timeout(),
            self.source.fetch_snapshot(&state.repo),
        )
        .await
        .unwrap_or(Err(SourceError::Timeout {
            secs: cfg.fetch_timeout_secs,
        }));

        match fetched {
            Ok(snapshot) => {
                self.record_success(&state.id);
                if snapshot.is_partial() {
                    obs::emit_partial_snapshot(state.id.as_str(), &snapshot.unknown_fields());
                }
                Ok(snapshot)
            }
            Err(err) => {
                self.record_failure(&state.id, &err);
                Err(PetError::SourceUnavailable {
                    repo: state.repo.to_string(),
                    source: err,
                })
            }
        }
    }

    async fn run_cycle(&self, id: &PetId, trigger: CycleTrigger) -> Result<CycleOutcome> {
        let gate = self.gate(id);
        let outcome = {
            let _turn = gate.lock().await;
            self.run_locked(id, trigger).await
        };
        drop(gate);
        self.release(id);
        outcome
    }

    async fn run_locked(&self, id: &PetId, trigger: CycleTrigger) -> Result<CycleOutcome> {
        let mut current = self.store.load(id).await?;
        check_trigger(&current, trigger)?;

        let snapshot = if trigger.fetches() {
            Some(self.fetch(&current).await?)
        } else if trigger == CycleTrigger::Feed {
            Some(MetricSnapshot::feeding(current.repo.clone(), Utc::now()))
        } else {
            None
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let Computed {
                next,
                delta,
                transition,
            } = self.compute(&current, snapshot.as_ref());
            match self.store.save(next).await {
                Ok(saved) => return Ok(self.finish(saved, delta, transition, attempts)),
                Err(StorageError::VersionConflict { .. }) if attempts < MAX_SAVE_ATTEMPTS => {
                    METRICS.inc_version_conflicts();
                    obs::emit_version_conflict(id.as_str(), attempts);
                    current = self.store.load(id).await?;
                    check_trigger(&current, trigger)?;
                }
                Err(StorageError::VersionConflict { .. }) => {
                    METRICS.inc_version_conflicts();
                    obs::emit_version_conflict(id.as_str(), attempts);
                    return Err(PetError::VersionConflict {
                        pet_id: id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn compute(&self, current: &PetState, snapshot: Option<&MetricSnapshot>) -> Computed {
        match snapshot {
            Some(snapshot) => {
                let (next, CycleReport { delta, transition }) = apply_cycle(
                    current,
                    snapshot,
                    &self.evaluator,
                    &self.engine,
                    &self.config.vitals,
                );
                Computed {
                    next,
                    delta: Some(delta),
                    transition,
                }
            }
            None => {
                let (next, transition) =
                    revive_state(current, &self.engine, &self.config.vitals, Utc::now());
                Computed {
                    next,
                    delta: None,
                    transition: Some(transition),
                }
            }
        }
    }

    fn finish(
        &self,
        saved: PetState,
        delta: Option<HealthDelta>,
        transition: Option<StageTransition>,
        attempts: u32,
    ) -> CycleOutcome {
        let id = saved.id.as_str();
        METRICS.inc_cycles_applied();
        obs::emit_cycle_applied(
            id,
            saved.version,
            saved.happiness,
            saved.hunger,
            delta.as_ref().map(|d| d.events.len()).unwrap_or(0),
            attempts,
        );
        if let Some(t) = transition {
            METRICS.inc_evolutions();
            obs::emit_evolved(id, t.from.as_str(), t.to.as_str());
        }
        CycleOutcome {
            state: saved,
            delta,
            transition,
            attempts,
        }
    }
}

/// Next state of one cycle, before it is saved.
struct Computed {
    next: PetState,
    delta: Option<HealthDelta>,
    transition: Option<StageTransition>,
}

/// Remove `id`'s slot if it has no timer, no pending failures and its gate
/// is referenced by the map alone. Callers of `gate` clone the `Arc` under
/// the same lock, so a cycle that holds or awaits the gate always keeps the
/// slot alive.
fn prune_idle(slots: &mut HashMap<PetId, Slot>, id: &PetId) {
    let idle = slots
        .get(id)
        .map(|slot| {
            slot.timer.is_none() && slot.failures == 0 && Arc::strong_count(&slot.gate) == 1
        })
        .unwrap_or(false);
    if idle {
        slots.remove(id);
    }
}

/// Reject manual actions that make no sense for the pet's stage.
fn check_trigger(state: &PetState, trigger: CycleTrigger) -> Result<()> {
    let dormant = state.stage == EvolutionStage::Dormant;
    let reason = match trigger {
        CycleTrigger::Feed if dormant => "a dormant pet must be revived before feeding",
        CycleTrigger::Revive if !dormant => "only a dormant pet can be revived",
        _ => return Ok(()),
    };
    Err(PetError::InvalidAction {
        pet_id: state.id.to_string(),
        action: trigger.as_str(),
        reason: reason.to_string(),
    })
}

async fn poll_loop(
    inner: Weak<Inner>,
    id: PetId,
    first_delay: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut delay = first_delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.changed() => break,
        }
        if *cancel.borrow() {
            break;
        }
        let Some(strong) = inner.upgrade() else {
            break;
        };

        let span = obs::cycle_span(id.as_str(), CycleTrigger::Scheduled.as_str());
        match strong
            .run_cycle(&id, CycleTrigger::Scheduled)
            .instrument(span)
            .await
        {
            Ok(_) | Err(PetError::SourceUnavailable { .. }) => {}
            Err(PetError::NotFound(_)) => {
                warn!(pet_id = %id, "tracked pet no longer stored; stopping timer");
                break;
            }
            Err(e) => warn!(pet_id = %id, error = %e, "scheduled cycle failed"),
        }
        delay = next_delay(strong.failures(&id), &strong.config.scheduler);
    }
    debug!(pet_id = %id, "poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let cfg = cfg();
        assert_eq!(next_delay(0, &cfg), Duration::from_secs(1800));
        assert_eq!(next_delay(1, &cfg), Duration::from_secs(60));
        assert_eq!(next_delay(2, &cfg), Duration::from_secs(120));
        assert_eq!(next_delay(3, &cfg), Duration::from_secs(240));
        assert_eq!(next_delay(4, &cfg), Duration::from_secs(480));
    }

    #[test]
    fn ceiling_caps_long_backoff() {
        let cfg = SchedulerConfig {
            degraded_threshold: 50,
            ..cfg()
        };
        assert_eq!(next_delay(7, &cfg), Duration::from_secs(3600));
        assert_eq!(next_delay(40, &cfg), Duration::from_secs(3600));
    }

    #[test]
    fn degraded_from_threshold() {
        let cfg = cfg();
        assert_eq!(poll_mode(0, &cfg), PollMode::Normal);
        assert_eq!(poll_mode(4, &cfg), PollMode::Backoff);
        assert_eq!(poll_mode(5, &cfg), PollMode::Degraded);
        assert_eq!(next_delay(5, &cfg), Duration::from_secs(4 * 3600));
        assert_eq!(next_delay(u32::MAX, &cfg), Duration::from_secs(4 * 3600));
    }

    #[test]
    fn manual_actions_respect_dormancy() {
        let mut pet = PetState::hatch(
            tamagotchi_state::RepoRef::new("octo", "cat"),
            "cat",
            50,
            0,
        );
        assert!(check_trigger(&pet, CycleTrigger::Feed).is_ok());
        assert!(matches!(
            check_trigger(&pet, CycleTrigger::Revive),
            Err(PetError::InvalidAction { action: "revive", .. })
        ));

        pet.stage = EvolutionStage::Dormant;
        assert!(check_trigger(&pet, CycleTrigger::Revive).is_ok());
        assert!(check_trigger(&pet, CycleTrigger::ForceRefresh).is_ok());
        assert!(matches!(
            check_trigger(&pet, CycleTrigger::Feed),
            Err(PetError::InvalidAction { action: "feed", .. })
        ));
    }
}
