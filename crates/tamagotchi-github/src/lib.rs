//! Tamagotchi-GitHub: GitHub REST metric source for GitHub Tamagotchi
//!
//! This crate fetches the repository activity a pet feeds on: commit
//! recency, open pull requests and issues, default-branch CI status,
//! dependency bot backlog and recent merges.
//!
//! ## Key Components
//!
//! - `GitHubMetricSource`: `MetricSource` over the REST API (`reqwest`)
//! - `GitHubConfig`: endpoint, token and thresholds (token from `GITHUB_TOKEN`)
//! - `payload`: response models and pure derivations

pub mod client;
pub mod error;
pub mod payload;

pub use client::{GitHubConfig, GitHubMetricSource};
pub use error::GitHubError;

/// Result type for GitHub client operations
pub type Result<T> = std::result::Result<T, GitHubError>;
