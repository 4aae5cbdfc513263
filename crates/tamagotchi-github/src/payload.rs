//! GitHub REST payloads and the measurements derived from them.
//!
//! Only the fields the pet engine reads are modelled. The derivations are
//! pure and take `now` so they can be checked against fixed fixtures.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tamagotchi_core::{CiStatus, Observation};

/// Logins of the dependency update bots whose PRs count towards staleness.
pub const DEPENDENCY_BOTS: [&str; 2] = ["dependabot[bot]", "renovate[bot]"];

#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub committer: Option<Signature>,
    pub author: Option<Signature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signature {
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullItem {
    pub created_at: DateTime<Utc>,
    pub user: Option<User>,
    pub merged_at: Option<DateTime<Utc>>,
    pub base: Option<BaseRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueItem {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: u32,
    /// Present when the "issue" is really a pull request
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedStatus {
    pub state: String,
    #[serde(default)]
    pub total_count: u32,
}

fn hours_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - earlier).num_seconds().max(0) as f64) / 3600.0
}

/// Days since the newest commit; unknown for an empty history.
pub fn days_since_last_commit(commits: &[CommitItem], now: DateTime<Utc>) -> Observation<f64> {
    commits
        .first()
        .and_then(|c| c.commit.committer.as_ref().or(c.commit.author.as_ref()))
        .map(|sig| hours_between(sig.date, now) / 24.0)
        .into()
}

/// Age in hours of the oldest open pull request, 0 when there is none.
pub fn oldest_pull_age_hours(pulls: &[PullItem], now: DateTime<Utc>) -> f64 {
    pulls
        .iter()
        .map(|p| p.created_at)
        .min()
        .map(|oldest| hours_between(oldest, now))
        .unwrap_or(0.0)
}

/// Real issues (not pull requests) nobody has commented on yet.
pub fn unanswered_issues(issues: &[IssueItem]) -> impl Iterator<Item = &IssueItem> {
    issues
        .iter()
        .filter(|i| i.pull_request.is_none() && i.comments == 0)
}

/// Age in days of the oldest unanswered issue, 0 when there is none.
pub fn oldest_unanswered_issue_age_days(issues: &[IssueItem], now: DateTime<Utc>) -> f64 {
    unanswered_issues(issues)
        .map(|i| i.created_at)
        .min()
        .map(|oldest| hours_between(oldest, now) / 24.0)
        .unwrap_or(0.0)
}

/// Number of open issues that are not pull requests.
pub fn open_issue_count(issues: &[IssueItem]) -> u32 {
    issues.iter().filter(|i| i.pull_request.is_none()).count() as u32
}

/// Map a combined commit status to the CI outcome.
///
/// `pending` and a status with no contexts at all say nothing about CI.
pub fn ci_status(status: &CombinedStatus) -> CiStatus {
    match status.state.as_str() {
        _ if status.total_count == 0 => CiStatus::Unknown,
        "success" => CiStatus::Success,
        "failure" | "error" => CiStatus::Failure,
        _ => CiStatus::Unknown,
    }
}

/// Whether a pull request landed on `branch` within the last `window_hours`.
pub fn merged_within(
    closed: &[PullItem],
    branch: &str,
    window_hours: f64,
    now: DateTime<Utc>,
) -> bool {
    closed.iter().any(|p| {
        let on_branch = p.base.as_ref().map(|b| b.name == branch).unwrap_or(true);
        let recent = p
            .merged_at
            .map(|at| hours_between(at, now) <= window_hours)
            .unwrap_or(false);
        on_branch && recent
    })
}

/// Whether a dependency bot PR has been left open longer than `stale_days`.
pub fn dependencies_stale(open: &[PullItem], stale_days: f64, now: DateTime<Utc>) -> bool {
    open.iter().any(|p| {
        let from_bot = p
            .user
            .as_ref()
            .map(|u| DEPENDENCY_BOTS.contains(&u.login.as_str()))
            .unwrap_or(false);
        from_bot && hours_between(p.created_at, now) / 24.0 > stale_days
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2024-06-15T12:00:00Z".parse().unwrap()
    }

    fn pulls() -> Vec<PullItem> {
        serde_json::from_value(json!([
            {
                "created_at": "2024-06-14T12:00:00Z",
                "user": {"login": "octocat"},
                "merged_at": null,
                "base": {"ref": "main"}
            },
            {
                "created_at": "2024-06-01T12:00:00Z",
                "user": {"login": "dependabot[bot]"},
                "merged_at": null,
                "base": {"ref": "main"}
            }
        ]))
        .unwrap()
    }

    #[test]
    fn commit_age_in_days() {
        let commits: Vec<CommitItem> = serde_json::from_value(json!([
            {"commit": {"committer": {"date": "2024-06-11T12:00:00Z"}, "author": null}}
        ]))
        .unwrap();
        assert_eq!(days_since_last_commit(&commits, now()), Observation::Known(4.0));
        assert_eq!(days_since_last_commit(&[], now()), Observation::Unknown);
    }

    #[test]
    fn oldest_pull_and_bot_staleness() {
        let pulls = pulls();
        assert_eq!(oldest_pull_age_hours(&pulls, now()), 14.0 * 24.0);
        assert_eq!(oldest_pull_age_hours(&[], now()), 0.0);
        assert!(dependencies_stale(&pulls, 7.0, now()));
        assert!(!dependencies_stale(&pulls, 20.0, now()));
        assert!(!dependencies_stale(&pulls[..1], 0.0, now()));
    }

    #[test]
    fn issues_skip_pull_requests_and_answered_ones() {
        let issues: Vec<IssueItem> = serde_json::from_value(json!([
            {"created_at": "2024-05-01T12:00:00Z", "comments": 0, "pull_request": {"url": "x"}},
            {"created_at": "2024-05-15T12:00:00Z", "comments": 3},
            {"created_at": "2024-06-05T12:00:00Z", "comments": 0}
        ]))
        .unwrap();
        assert_eq!(open_issue_count(&issues), 2);
        assert_eq!(unanswered_issues(&issues).count(), 1);
        assert_eq!(oldest_unanswered_issue_age_days(&issues, now()), 10.0);
    }

    #[test]
    fn combined_status_mapping() {
        let status = |state: &str, total_count: u32| CombinedStatus {
            state: state.to_string(),
            total_count,
        };
        assert_eq!(ci_status(&status("success", 2)), CiStatus::Success);
        assert_eq!(ci_status(&status("failure", 1)), CiStatus::Failure);
        assert_eq!(ci_status(&status("error", 1)), CiStatus::Failure);
        assert_eq!(ci_status(&status("pending", 1)), CiStatus::Unknown);
        assert_eq!(ci_status(&status("pending", 0)), CiStatus::Unknown);
    }

    #[test]
    fn merge_window_and_branch() {
        let closed: Vec<PullItem> = serde_json::from_value(json!([
            {"created_at": "2024-06-10T00:00:00Z", "merged_at": "2024-06-15T02:00:00Z", "base": {"ref": "develop"}},
            {"created_at": "2024-06-10T00:00:00Z", "merged_at": null, "base": {"ref": "main"}},
            {"created_at": "2024-06-10T00:00:00Z", "merged_at": "2024-06-13T12:00:00Z", "base": {"ref": "main"}}
        ]))
        .unwrap();
        assert!(!merged_within(&closed, "main", 24.0, now()));
        assert!(merged_within(&closed, "main", 48.0, now()));
        assert!(merged_within(&closed, "develop", 24.0, now()));
    }
}
