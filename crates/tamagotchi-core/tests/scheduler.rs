use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tamagotchi_core::{
    CycleTrigger, EventTag, MetricSnapshot, MetricSource, Observation, PetError, PetState,
    PetStateStore, PollMode, RefreshScheduler, RepoRef, Scripted, ScriptedSource, SourceError,
    TamagotchiConfig,
};
use tamagotchi_state::{MemoryPetStore, PetId, StorageResult};

fn repo() -> RepoRef {
    RepoRef::new("octo", "cat")
}

async fn seeded(store: &dyn PetStateStore) -> PetState {
    store
        .create(PetState::hatch(repo(), "cat", 50, 0))
        .await
        .unwrap()
}

fn hungry_snapshot() -> MetricSnapshot {
    MetricSnapshot {
        days_since_last_commit: Observation::Known(4.0),
        ..MetricSnapshot::unknown(repo(), Utc::now())
    }
}

/// Store wrapper that simulates another writer landing just before the
/// next `remaining` saves.
struct RacingStore {
    inner: Arc<MemoryPetStore>,
    remaining: AtomicU32,
}

#[async_trait]
impl PetStateStore for RacingStore {
    async fn create(&self, state: PetState) -> StorageResult<PetState> {
        self.inner.create(state).await
    }

    async fn load(&self, id: &PetId) -> StorageResult<PetState> {
        self.inner.load(id).await
    }

    async fn find_by_repo(&self, repo: &RepoRef) -> StorageResult<Option<PetState>> {
        self.inner.find_by_repo(repo).await
    }

    async fn save(&self, state: PetState) -> StorageResult<PetState> {
        let interfere = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if interfere {
            self.inner.touch(&state.id)?;
        }
        self.inner.save(state).await
    }

    async fn list(&self) -> StorageResult<Vec<PetState>> {
        self.inner.list().await
    }
}

/// Source that takes `delay` per fetch and records how many fetches overlap.
struct SlowSource {
    delay: Duration,
    active: AtomicU32,
    max_active: AtomicU32,
}

impl SlowSource {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicU32::new(0),
            max_active: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MetricSource for SlowSource {
    async fn fetch_snapshot(&self, repo: &RepoRef) -> Result<MetricSnapshot, SourceError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(MetricSnapshot {
            days_since_last_commit: Observation::Known(4.0),
            ..MetricSnapshot::unknown(repo.clone(), Utc::now())
        })
    }
}

#[tokio::test]
async fn consecutive_failures_degrade_without_mutation() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(ScriptedSource::fixed(hungry_snapshot()));
    for _ in 0..5 {
        source.push(Scripted::Fail(SourceError::Unavailable("502".to_string())));
    }
    let scheduler = RefreshScheduler::new(store.clone(), source.clone(), TamagotchiConfig::default());

    for n in 1..=5u32 {
        let err = scheduler
            .run_cycle(&pet.id, CycleTrigger::ForceRefresh)
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::SourceUnavailable { .. }), "{err}");
        let status = scheduler.poll_status(&pet.id).unwrap();
        assert_eq!(status.consecutive_failures, n);
    }

    let status = scheduler.poll_status(&pet.id).unwrap();
    assert_eq!(status.mode, PollMode::Degraded);
    assert_eq!(status.next_delay, Duration::from_secs(4 * 3600));
    assert_eq!(store.load(&pet.id).await.unwrap(), pet);

    let outcome = scheduler
        .run_cycle(&pet.id, CycleTrigger::ForceRefresh)
        .await
        .unwrap();
    assert_eq!(outcome.state.version, 2);
    assert_eq!(outcome.state.hunger, 10);
    assert_eq!(
        scheduler.poll_status(&pet.id).unwrap().mode,
        PollMode::Normal
    );
    assert_eq!(source.calls(), 6);
}

#[tokio::test]
async fn concurrent_feeds_are_serialized() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let scheduler = RefreshScheduler::new(
        store.clone(),
        Arc::new(ScriptedSource::quiet()),
        TamagotchiConfig::default(),
    );

    let (a, b) = tokio::join!(
        scheduler.run_cycle(&pet.id, CycleTrigger::Feed),
        scheduler.run_cycle(&pet.id, CycleTrigger::Feed),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.attempts, 1);
    assert_eq!(b.attempts, 1);

    let stored = store.load(&pet.id).await.unwrap();
    assert_eq!(stored.version, 3);
    let fed = stored
        .history()
        .iter()
        .filter(|e| e.tag == EventTag::FedAndGrew)
        .count();
    assert_eq!(fed, 2);
}

#[tokio::test]
async fn conflicting_writer_triggers_one_retry() {
    let memory = Arc::new(MemoryPetStore::new());
    let pet = seeded(memory.as_ref()).await;
    let store = Arc::new(RacingStore {
        inner: memory.clone(),
        remaining: AtomicU32::new(1),
    });
    let scheduler = RefreshScheduler::new(
        store,
        Arc::new(ScriptedSource::quiet()),
        TamagotchiConfig::default(),
    );

    let outcome = scheduler
        .run_cycle(&pet.id, CycleTrigger::Feed)
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);
    // create -> 1, external touch -> 2, retried save -> 3
    assert_eq!(outcome.state.version, 3);
    assert_eq!(outcome.state.happiness, 60);
}

#[tokio::test]
async fn persistent_conflict_is_reported() {
    let memory = Arc::new(MemoryPetStore::new());
    let pet = seeded(memory.as_ref()).await;
    let store = Arc::new(RacingStore {
        inner: memory.clone(),
        remaining: AtomicU32::new(2),
    });
    let scheduler = RefreshScheduler::new(
        store,
        Arc::new(ScriptedSource::quiet()),
        TamagotchiConfig::default(),
    );

    let err = scheduler
        .run_cycle(&pet.id, CycleTrigger::Feed)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PetError::VersionConflict {
            pet_id: pet.id.to_string()
        }
    );

    let stored = memory.load(&pet.id).await.unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.happiness, 50);
    assert!(stored.history().is_empty());
}

#[tokio::test]
async fn unknown_pet_is_not_found() {
    let scheduler = RefreshScheduler::new(
        Arc::new(MemoryPetStore::new()),
        Arc::new(ScriptedSource::quiet()),
        TamagotchiConfig::default(),
    );
    let err = scheduler
        .run_cycle(&PetId::new(), CycleTrigger::ForceRefresh)
        .await
        .unwrap_err();
    assert!(matches!(err, PetError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_as_source_failure() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(ScriptedSource::quiet());
    source.push(Scripted::Hang(Duration::from_secs(120)));
    let scheduler = RefreshScheduler::new(store.clone(), source, TamagotchiConfig::default());

    let err = scheduler
        .run_cycle(&pet.id, CycleTrigger::ForceRefresh)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PetError::SourceUnavailable {
            source: SourceError::Timeout { secs: 30 },
            ..
        }
    ));
    assert_eq!(store.load(&pet.id).await.unwrap().version, 1);
    assert_eq!(
        scheduler.poll_status(&pet.id).unwrap().mode,
        PollMode::Backoff
    );
}

#[tokio::test(start_paused = true)]
async fn timer_runs_cycles_at_the_interval() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(ScriptedSource::fixed(hungry_snapshot()));
    let scheduler = RefreshScheduler::new(store.clone(), source.clone(), TamagotchiConfig::default());

    scheduler.track(&pet.id);
    assert!(scheduler.is_tracked(&pet.id));

    tokio::time::sleep(Duration::from_secs(1799)).await;
    assert_eq!(source.calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let stored = store.load(&pet.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.hunger, 10);

    tokio::time::sleep(Duration::from_secs(1800)).await;
    assert_eq!(store.load(&pet.id).await.unwrap().hunger, 20);

    scheduler.shutdown().await;
    assert!(!scheduler.is_tracked(&pet.id));
}

#[tokio::test(start_paused = true)]
async fn failing_timer_backs_off() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(ScriptedSource::failing(SourceError::RateLimited));
    let scheduler = RefreshScheduler::new(store.clone(), source.clone(), TamagotchiConfig::default());

    scheduler.track(&pet.id);
    tokio::time::sleep(Duration::from_secs(1801)).await;
    assert_eq!(source.calls(), 1);
    let status = scheduler.poll_status(&pet.id).unwrap();
    assert_eq!(status.mode, PollMode::Backoff);
    assert_eq!(status.next_delay, Duration::from_secs(60));

    // retries after 60s, then 120s
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls(), 2);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(source.calls(), 3);
    assert_eq!(store.load(&pet.id).await.unwrap().version, 1);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn untracked_pet_is_left_alone() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(ScriptedSource::fixed(hungry_snapshot()));
    let scheduler = RefreshScheduler::new(store.clone(), source.clone(), TamagotchiConfig::default());

    scheduler.track(&pet.id);
    scheduler.track(&pet.id);
    assert_eq!(scheduler.tracked(), vec![pet.id.clone()]);
    assert!(scheduler.untrack(&pet.id));
    assert!(!scheduler.untrack(&pet.id));

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(source.calls(), 0);
    assert_eq!(store.load(&pet.id).await.unwrap().version, 1);
}

#[tokio::test(start_paused = true)]
async fn untrack_during_cycle_keeps_cycles_exclusive() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(SlowSource::new(Duration::from_secs(5)));
    let scheduler = RefreshScheduler::new(store.clone(), source.clone(), TamagotchiConfig::default());
    scheduler.track(&pet.id);

    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        let id = pet.id.clone();
        async move { scheduler.run_cycle(&id, CycleTrigger::ForceRefresh).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.active.load(Ordering::SeqCst), 1);

    assert!(scheduler.untrack(&pet.id));
    let second = tokio::spawn({
        let scheduler = scheduler.clone();
        let id = pet.id.clone();
        async move { scheduler.run_cycle(&id, CycleTrigger::ForceRefresh).await }
    });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(first.attempts, 1);
    assert_eq!(second.attempts, 1);
    assert_eq!(second.state.version, 3);
    assert_eq!(store.load(&pet.id).await.unwrap().hunger, 20);

    // Nothing is left behind for the untracked pet once it is idle.
    assert!(scheduler.poll_status(&pet.id).is_none());
}

#[tokio::test]
async fn manual_cycles_leave_no_slot_for_untracked_pets() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let scheduler = RefreshScheduler::new(
        store.clone(),
        Arc::new(ScriptedSource::quiet()),
        TamagotchiConfig::default(),
    );

    scheduler.track(&pet.id);
    assert!(scheduler.untrack(&pet.id));
    scheduler
        .run_cycle(&pet.id, CycleTrigger::Feed)
        .await
        .unwrap();
    assert!(scheduler.poll_status(&pet.id).is_none());
    assert!(scheduler.tracked().is_empty());

    let ghost = PetId::new();
    let err = scheduler
        .run_cycle(&ghost, CycleTrigger::ForceRefresh)
        .await
        .unwrap_err();
    assert!(matches!(err, PetError::NotFound(_)));
    assert!(scheduler.poll_status(&ghost).is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduled_failures_degrade_then_recover() {
    let store = Arc::new(MemoryPetStore::new());
    let pet = seeded(store.as_ref()).await;
    let source = Arc::new(ScriptedSource::fixed(hungry_snapshot()));
    for _ in 0..5 {
        source.push(Scripted::Fail(SourceError::Unavailable("502".to_string())));
    }
    let scheduler = RefreshScheduler::new(store.clone(), source.clone(), TamagotchiConfig::default());
    scheduler.track(&pet.id);

    // Failures at 1800s, then retries after 60, 120, 240 and 480 seconds.
    tokio::time::sleep(Duration::from_secs(1800 + 60 + 120 + 240 + 480 + 1)).await;
    assert_eq!(source.calls(), 5);
    let status = scheduler.poll_status(&pet.id).unwrap();
    assert_eq!(status.mode, PollMode::Degraded);
    assert_eq!(status.consecutive_failures, 5);
    assert_eq!(status.next_delay, Duration::from_secs(4 * 3600));
    assert_eq!(store.load(&pet.id).await.unwrap().version, 1);

    // Degraded polling waits the slow interval.
    tokio::time::sleep(Duration::from_secs(4 * 3600 - 2)).await;
    assert_eq!(source.calls(), 5);
    assert_eq!(store.load(&pet.id).await.unwrap().version, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.calls(), 6);
    let stored = store.load(&pet.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.hunger, 10);
    let status = scheduler.poll_status(&pet.id).unwrap();
    assert_eq!(status.mode, PollMode::Normal);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.next_delay, Duration::from_secs(1800));

    scheduler.shutdown().await;
}
