//! Metric sources: where snapshots come from.
//!
//! `MetricSource` is the outbound seam to the hosting service. The GitHub
//! client lives in its own crate; `ScriptedSource` is the in-memory fake the
//! scheduler and service tests drive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tamagotchi_state::RepoRef;

use crate::domain::{MetricSnapshot, SourceError};

/// Fetches repository measurements.
///
/// A fetch either yields a snapshot (possibly with unknown fields) or fails
/// as a whole; partial failures are expressed as `Observation::Unknown`.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch_snapshot(&self, repo: &RepoRef) -> Result<MetricSnapshot, SourceError>;
}

/// Scripted step of a [`ScriptedSource`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Snapshot(MetricSnapshot),
    Fail(SourceError),
    /// Sleep before answering, to exercise fetch timeouts
    Hang(Duration),
}

/// In-memory source that replays a script, then falls back to a default.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    calls: AtomicU64,
}

impl ScriptedSource {
    /// Every fetch returns an all-unknown snapshot for the requested repo.
    pub fn quiet() -> Self {
        Self::with_fallback(Scripted::Hang(Duration::ZERO))
    }

    /// Every fetch fails with `err`.
    pub fn failing(err: SourceError) -> Self {
        Self::with_fallback(Scripted::Fail(err))
    }

    /// Every fetch returns `snapshot` (re-stamped with the current time).
    pub fn fixed(snapshot: MetricSnapshot) -> Self {
        Self::with_fallback(Scripted::Snapshot(snapshot))
    }

    fn with_fallback(fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicU64::new(0),
        }
    }

    /// Queue one step ahead of the fallback.
    pub fn push(&self, step: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Scripted {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn fetch_snapshot(&self, repo: &RepoRef) -> Result<MetricSnapshot, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Scripted::Snapshot(snapshot) => Ok(MetricSnapshot {
                repo: repo.clone(),
                fetched_at: Utc::now(),
                ..snapshot
            }),
            Scripted::Fail(err) => Err(err),
            Scripted::Hang(wait) => {
                tokio::time::sleep(wait).await;
                Ok(MetricSnapshot::unknown(repo.clone(), Utc::now()))
            }
        }
    }
}
