//! Metric snapshots: one fetched set of repository measurements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tamagotchi_state::{CiStatus, RepoRef};

/// A measurement that the source may or may not have been able to supply.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Observation<T> {
    Known(T),
    #[default]
    Unknown,
}

impl<T> Observation<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Observation::Known(_))
    }
}

impl<T> From<Option<T>> for Observation<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Observation::Known(v),
            None => Observation::Unknown,
        }
    }
}

/// Repository activity measured at `fetched_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub repo: RepoRef,
    pub days_since_last_commit: Observation<f64>,
    pub oldest_open_pr_age_hours: Observation<f64>,
    pub oldest_unanswered_issue_age_days: Observation<f64>,
    pub last_ci_status: CiStatus,
    pub dependencies_stale: Observation<bool>,
    /// Whether a pull request was recently merged into the default branch
    pub merged_to_main: Observation<bool>,
    pub open_pull_requests: Observation<u32>,
    pub open_issues: Observation<u32>,
    pub fetched_at: DateTime<Utc>,
}

impl MetricSnapshot {
    /// A snapshot in which nothing is known.
    pub fn unknown(repo: RepoRef, fetched_at: DateTime<Utc>) -> Self {
        Self {
            repo,
            days_since_last_commit: Observation::Unknown,
            oldest_open_pr_age_hours: Observation::Unknown,
            oldest_unanswered_issue_age_days: Observation::Unknown,
            last_ci_status: CiStatus::Unknown,
            dependencies_stale: Observation::Unknown,
            merged_to_main: Observation::Unknown,
            open_pull_requests: Observation::Unknown,
            open_issues: Observation::Unknown,
            fetched_at,
        }
    }

    /// Synthetic positive snapshot used by the manual feed action: a fresh
    /// commit merged to main, everything else unknown.
    pub fn feeding(repo: RepoRef, fetched_at: DateTime<Utc>) -> Self {
        Self {
            days_since_last_commit: Observation::Known(0.0),
            merged_to_main: Observation::Known(true),
            ..Self::unknown(repo, fetched_at)
        }
    }

    /// True when at least one rule input is unknown.
    pub fn is_partial(&self) -> bool {
        !(self.days_since_last_commit.is_known()
            && self.oldest_open_pr_age_hours.is_known()
            && self.oldest_unanswered_issue_age_days.is_known()
            && self.last_ci_status != CiStatus::Unknown
            && self.dependencies_stale.is_known()
            && self.merged_to_main.is_known())
    }

    /// Names of the rule inputs the source could not supply.
    pub fn unknown_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.days_since_last_commit.is_known() {
            missing.push("days_since_last_commit");
        }
        if !self.oldest_open_pr_age_hours.is_known() {
            missing.push("oldest_open_pr_age_hours");
        }
        if !self.oldest_unanswered_issue_age_days.is_known() {
            missing.push("oldest_unanswered_issue_age_days");
        }
        if self.last_ci_status == CiStatus::Unknown {
            missing.push("last_ci_status");
        }
        if !self.dependencies_stale.is_known() {
            missing.push("dependencies_stale");
        }
        if !self.merged_to_main.is_known() {
            missing.push("merged_to_main");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feeding_snapshot_is_partial_but_fresh() {
        let snap = MetricSnapshot::feeding(RepoRef::new("o", "r"), Utc::now());
        assert_eq!(snap.days_since_last_commit, Observation::Known(0.0));
        assert_eq!(snap.merged_to_main, Observation::Known(true));
        assert!(snap.is_partial());
        assert!(!snap.unknown_fields().contains(&"merged_to_main"));
    }

    #[test]
    fn observation_serializes_tagged() {
        let known = serde_json::to_value(Observation::Known(4.5)).unwrap();
        assert_eq!(known, serde_json::json!({"state": "known", "value": 4.5}));
        let unknown = serde_json::to_value(Observation::<f64>::Unknown).unwrap();
        assert_eq!(unknown, serde_json::json!({"state": "unknown"}));
    }

    #[test]
    fn observation_from_option() {
        assert_eq!(Observation::from(Some(3u32)), Observation::Known(3));
        assert_eq!(Observation::<u32>::from(None), Observation::Unknown);
    }
}
