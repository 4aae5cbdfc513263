//! Error types for tamagotchi-github

use tamagotchi_core::SourceError;
use thiserror::Error;

/// Errors that can occur while talking to the GitHub REST API
#[derive(Error, Debug)]
pub enum GitHubError {
    /// HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// Transport-level failure (DNS, TLS, connection reset, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rate limit exhausted; `reset` is the epoch second it lifts, if known
    #[error("GitHub API rate limit exceeded")]
    RateLimited { reset: Option<i64> },

    /// Repository or resource does not exist (or is not visible to the token)
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("GitHub API returned {status} for {url}")]
    Status { status: u16, url: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Http(err.to_string())
    }
}

impl From<GitHubError> for SourceError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::RateLimited { .. } => SourceError::RateLimited,
            other => SourceError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_source_rate_limit() {
        let err: SourceError = GitHubError::RateLimited { reset: Some(1) }.into();
        assert_eq!(err, SourceError::RateLimited);

        let err: SourceError = GitHubError::NotFound("/repos/a/b".to_string()).into();
        assert!(matches!(err, SourceError::Unavailable(ref m) if m.contains("/repos/a/b")));
    }
}
