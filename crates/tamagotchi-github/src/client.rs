//! GitHub REST client implementing `MetricSource`.
//!
//! One snapshot is assembled from a handful of REST calls. The repository
//! lookup must succeed; every other call degrades to an unknown
//! observation on failure, except rate limiting, which aborts the fetch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tamagotchi_core::{MetricSnapshot, MetricSource, Observation, RepoRef, SourceError};
use tracing::{debug, warn};

use crate::error::GitHubError;
use crate::payload::{self, CombinedStatus, CommitItem, IssueItem, PullItem, RepoInfo};
use crate::Result;

/// GitHub client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API base URL
    pub api_base: String,
    /// Token for authenticated requests (higher rate limit, private repos)
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub user_agent: String,
    /// Age in days after which an open dependency bot PR marks the pet sick
    pub stale_dependency_pr_days: f64,
    /// How recent a merge must be to count as feeding
    pub merge_window_hours: f64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_base: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            user_agent: format!("github-tamagotchi/{}", env!("CARGO_PKG_VERSION")),
            stale_dependency_pr_days: 7.0,
            merge_window_hours: 24.0,
            request_timeout_secs: 20,
        }
    }
}

impl GitHubConfig {
    /// Create config for a specific API endpoint
    pub fn new(api_base: &str) -> Self {
        GitHubConfig {
            api_base: api_base.trim_end_matches('/').to_string(),
            token: None,
            ..Self::default()
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// GitHub REST implementation of [`MetricSource`]
pub struct GitHubMetricSource {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubMetricSource {
    /// Create a new GitHub source
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GitHubError::Client(e.to_string()))?;

        Ok(GitHubMetricSource {
            config,
            http_client,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let mut request = self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, response.headers(), url));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Turn a non-success response into the matching error.
fn classify_status(status: StatusCode, headers: &HeaderMap, url: String) -> GitHubError {
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());

    match status {
        StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimited { reset },
        StatusCode::FORBIDDEN if remaining == Some(0) => GitHubError::RateLimited { reset },
        StatusCode::NOT_FOUND => GitHubError::NotFound(url),
        other => GitHubError::Status {
            status: other.as_u16(),
            url,
        },
    }
}

/// Keep a sub-request's value, or degrade it to unknown.
///
/// Rate limiting is never degraded: it ends the whole fetch.
fn soften<T>(what: &str, result: Result<T>) -> std::result::Result<Option<T>, SourceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(GitHubError::RateLimited { reset }) => {
            warn!(request = what, reset = ?reset, "GitHub rate limit reached");
            Err(SourceError::RateLimited)
        }
        Err(e) => {
            warn!(request = what, error = %e, "GitHub request failed; field unknown");
            Ok(None)
        }
    }
}

#[async_trait]
impl MetricSource for GitHubMetricSource {
    async fn fetch_snapshot(
        &self,
        repo: &RepoRef,
    ) -> std::result::Result<MetricSnapshot, SourceError> {
        let base = format!("/repos/{}/{}", repo.owner, repo.name);
        let info: RepoInfo = self.get_json(&base, &[]).await?;
        let branch = info.default_branch.as_str();
        debug!(repo = %repo, branch, "fetching repository metrics");

        let commits = soften(
            "commits",
            self.get_json::<Vec<CommitItem>>(
                &format!("{base}/commits"),
                &[("sha", branch), ("per_page", "1")],
            )
            .await,
        )?;
        let open_pulls = soften(
            "open pulls",
            self.get_json::<Vec<PullItem>>(
                &format!("{base}/pulls"),
                &[("state", "open"), ("per_page", "100")],
            )
            .await,
        )?;
        let closed_pulls = soften(
            "closed pulls",
            self.get_json::<Vec<PullItem>>(
                &format!("{base}/pulls"),
                &[
                    ("state", "closed"),
                    ("base", branch),
                    ("sort", "updated"),
                    ("direction", "desc"),
                    ("per_page", "30"),
                ],
            )
            .await,
        )?;
        let issues = soften(
            "issues",
            self.get_json::<Vec<IssueItem>>(
                &format!("{base}/issues"),
                &[("state", "open"), ("per_page", "100")],
            )
            .await,
        )?;
        let status = soften(
            "status",
            self.get_json::<CombinedStatus>(&format!("{base}/commits/{branch}/status"), &[])
                .await,
        )?;

        // Measured after the calls so ages are never negative.
        let now = Utc::now();
        let cfg = &self.config;
        Ok(MetricSnapshot {
            repo: repo.clone(),
            days_since_last_commit: commits
                .as_deref()
                .map(|c| payload::days_since_last_commit(c, now))
                .unwrap_or(Observation::Unknown),
            oldest_open_pr_age_hours: open_pulls
                .as_deref()
                .map(|p| payload::oldest_pull_age_hours(p, now))
                .into(),
            oldest_unanswered_issue_age_days: issues
                .as_deref()
                .map(|i| payload::oldest_unanswered_issue_age_days(i, now))
                .into(),
            last_ci_status: status
                .as_ref()
                .map(payload::ci_status)
                .unwrap_or_default(),
            dependencies_stale: open_pulls
                .as_deref()
                .map(|p| payload::dependencies_stale(p, cfg.stale_dependency_pr_days, now))
                .into(),
            merged_to_main: closed_pulls
                .as_deref()
                .map(|p| payload::merged_within(p, branch, cfg.merge_window_hours, now))
                .into(),
            open_pull_requests: open_pulls.as_ref().map(|p| p.len() as u32).into(),
            open_issues: issues.as_deref().map(payload::open_issue_count).into(),
            fetched_at: now,
        })
    }
}
