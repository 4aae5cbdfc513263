//! Global atomic counters for pet engine observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on daemon shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    cycles_applied: AtomicU64,
    source_failures: AtomicU64,
    version_conflicts: AtomicU64,
    evolutions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_applied: AtomicU64::new(0),
            source_failures: AtomicU64::new(0),
            version_conflicts: AtomicU64::new(0),
            evolutions: AtomicU64::new(0),
        }
    }

    /// Increment the cycles-applied counter by one.
    pub fn inc_cycles_applied(&self) {
        self.cycles_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_applied", "counter incremented");
    }

    /// Increment the source-failures counter by one.
    pub fn inc_source_failures(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "source_failures", "counter incremented");
    }

    /// Increment the version-conflicts counter by one.
    pub fn inc_version_conflicts(&self) {
        self.version_conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "version_conflicts", "counter incremented");
    }

    /// Increment the evolutions counter by one.
    pub fn inc_evolutions(&self) {
        self.evolutions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evolutions", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (scheduler shutdown, CLI exit)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cycles_applied = self.cycles_applied(),
            source_failures = self.source_failures(),
            version_conflicts = self.version_conflicts(),
            evolutions = self.evolutions(),
        );
    }

    pub fn cycles_applied(&self) -> u64 {
        self.cycles_applied.load(Ordering::Relaxed)
    }

    pub fn source_failures(&self) -> u64 {
        self.source_failures.load(Ordering::Relaxed)
    }

    pub fn version_conflicts(&self) -> u64 {
        self.version_conflicts.load(Ordering::Relaxed)
    }

    pub fn evolutions(&self) -> u64 {
        self.evolutions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cycles_applied.store(0, Ordering::Relaxed);
        self.source_failures.store(0, Ordering::Relaxed);
        self.version_conflicts.store(0, Ordering::Relaxed);
        self.evolutions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.cycles_applied(), 0);
        m.inc_cycles_applied();
        m.inc_cycles_applied();
        assert_eq!(m.cycles_applied(), 2);

        m.inc_source_failures();
        assert_eq!(m.source_failures(), 1);

        m.inc_version_conflicts();
        m.inc_evolutions();
        m.inc_evolutions();
        assert_eq!(m.version_conflicts(), 1);
        assert_eq!(m.evolutions(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_cycles_applied();
        m.inc_source_failures();
        m.inc_version_conflicts();
        m.inc_evolutions();
        m.reset();
        assert_eq!(m.cycles_applied(), 0);
        assert_eq!(m.source_failures(), 0);
        assert_eq!(m.version_conflicts(), 0);
        assert_eq!(m.evolutions(), 0);
    }
}
