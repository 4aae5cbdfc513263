//! Structured observability hooks for pet lifecycle events.
//!
//! This module provides:
//! - A pet-scoped tracing span for refresh cycles via [`cycle_span`]
//! - Emission functions for key lifecycle events: registration, applied
//!   cycle, source failure, evolution, degraded polling, version conflict
//!
//! Events are emitted at `info!` level (warnings for failures). Verbosity is
//! controlled through `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

/// Span tagged with the pet and what triggered the cycle.
///
/// The span is attached with `Instrument::instrument` so it follows the
/// cycle future across await points.
///
/// # Example
///
/// ```ignore
/// use tamagotchi_core::CycleTrigger;
/// use tracing::Instrument;
/// scheduler
///     .run_cycle(&id, CycleTrigger::Scheduled)
///     .instrument(cycle_span("pet-123", "scheduled"))
///     .await;
/// ```
pub fn cycle_span(pet_id: &str, trigger: &str) -> tracing::Span {
    tracing::info_span!("tamagotchi.cycle", pet_id = %pet_id, trigger = %trigger)
}

/// Emit event: a pet was hatched for a repository.
pub fn emit_pet_registered(pet_id: &str, repo: &str) {
    info!(event = "pet.registered", pet_id = %pet_id, repo = %repo);
}

/// Emit event: a pet stopped being tracked.
pub fn emit_pet_deregistered(pet_id: &str) {
    info!(event = "pet.deregistered", pet_id = %pet_id);
}

/// Emit event: a cycle was persisted.
pub fn emit_cycle_applied(
    pet_id: &str,
    version: u64,
    happiness: i32,
    hunger: i32,
    events: usize,
    attempts: u32,
) {
    info!(
        event = "cycle.applied",
        pet_id = %pet_id,
        version = version,
        happiness = happiness,
        hunger = hunger,
        events = events,
        attempts = attempts,
    );
}

/// Emit event: a snapshot arrived with some fields unknown.
pub fn emit_partial_snapshot(pet_id: &str, unknown: &[&str]) {
    info!(event = "snapshot.partial", pet_id = %pet_id, unknown = ?unknown);
}

/// Emit event: the metric source failed (warning level).
pub fn emit_source_failure(pet_id: &str, consecutive: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "source.failure",
        pet_id = %pet_id,
        consecutive_failures = consecutive,
        error = %error,
    );
}

/// Emit event: a pet changed evolution stage.
pub fn emit_evolved(pet_id: &str, from: &str, to: &str) {
    info!(event = "pet.evolved", pet_id = %pet_id, from = %from, to = %to);
}

/// Emit event: polling for a pet switched to degraded mode (warning level).
pub fn emit_degraded(pet_id: &str, consecutive: u32) {
    warn!(event = "poll.degraded", pet_id = %pet_id, consecutive_failures = consecutive);
}

/// Emit event: polling returned to normal after failures.
pub fn emit_recovered(pet_id: &str, after_failures: u32) {
    info!(event = "poll.recovered", pet_id = %pet_id, after_failures = after_failures);
}

/// Emit event: a conditioned save lost a race (warning level).
pub fn emit_version_conflict(pet_id: &str, attempt: u32) {
    warn!(event = "cycle.version_conflict", pet_id = %pet_id, attempt = attempt);
}
