//! The `Store` trait — single async interface for all persistence.
//!
//! The poller and the dashboard depend only on this trait; backends are
//! swappable (libSQL file for real use, in-memory for demo mode and
//! tests). Backends serialize their own access; callers get no
//! atomicity across separate calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::TrackedPr;

/// Bury bookkeeping: the PR and the `last_updated` it carried when the
/// user buried it. Newer activity invalidates the bury.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuriedPr {
    pub url: String,
    pub last_updated: DateTime<Utc>,
}

/// Backend-agnostic persistence for PRs, poller state, and credentials.
#[async_trait]
pub trait Store: Send + Sync {
    /// The configured API credential, if any.
    async fn credential(&self) -> Result<Option<String>, StoreError>;

    /// Replace the configured API credential.
    async fn set_credential(&self, token: &str) -> Result<(), StoreError>;

    /// The active rate-limit window's end, if one is still in the
    /// future. An expired window is cleared by this read.
    async fn rate_limited_until(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Persist a rate-limit window so a restart still respects it.
    async fn set_rate_limited_until(&self, until: DateTime<Utc>) -> Result<(), StoreError>;

    /// When the last successful fetch completed.
    async fn last_fetched(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// All stored PRs, in no particular order.
    async fn prs(&self) -> Result<Vec<TrackedPr>, StoreError>;

    /// Replace the stored PR collection wholesale and record the fetch
    /// timestamp.
    async fn replace_prs(
        &self,
        prs: &[TrackedPr],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Currently-buried PRs with their bury-time `last_updated` snapshot.
    async fn buried_prs(&self) -> Result<Vec<BuriedPr>, StoreError>;

    /// Mark a PR buried.
    async fn bury(&self, url: &str) -> Result<(), StoreError>;

    /// Clear a PR's buried flag.
    async fn unbury(&self, url: &str) -> Result<(), StoreError>;
}
