//! Core data types shared across fetching, storage, scoring, and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tracked pull request.
///
/// `TrackedPr` must contain everything needed to score and order PRs
/// against each other, since it is also the stored representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackedPr {
    /// Canonical PR URL; unique within a fetch batch and the primary key
    /// in storage.
    pub url: String,
    pub title: String,
    pub author: String,
    pub repo_name: String,
    pub repo_owner: String,
    pub repo_url: String,
    /// `""`, `"APPROVED"`, or `"CHANGES_REQUESTED"`.
    pub review_status: String,
    pub is_draft: bool,
    pub last_updated: DateTime<Utc>,
    /// Login of the most recent non-bot PR-level commenter, or `""`.
    pub last_pr_commenter: String,
    /// Review threads where the acting user owes a response or an
    /// acknowledgment. Recomputed wholesale on every fetch.
    pub threads_actionable: u32,
    /// Review threads where the acting user holds the last word and is
    /// waiting on someone else. Recomputed wholesale on every fetch.
    pub threads_waiting: u32,
    pub additions: i64,
    pub deletions: i64,
    pub review_requested_from: Vec<String>,
    /// User-applied suppression flag; survives refreshes until the PR
    /// sees new activity.
    #[serde(default)]
    pub buried: bool,
    /// Raw GraphQL node, kept for debugging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_json: Option<serde_json::Value>,
}

/// One review thread attached to a PR.
#[derive(Debug, Clone, Default)]
pub struct ReviewThread {
    pub is_resolved: bool,
    pub is_outdated: bool,
    pub is_collapsed: bool,
    /// Comments in thread order; the first entry started the thread.
    pub comments: Vec<ThreadComment>,
}

/// One comment inside a review thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadComment {
    pub author: String,
    /// Logins of users who reacted (emoji) to this comment.
    pub reactors: Vec<String>,
}

/// A PR as returned by the fetch collaborator: the parsed record plus
/// the review threads it was parsed from, so the caller can run the
/// conversation classifier before storing.
#[derive(Debug, Clone)]
pub struct FetchedPr {
    pub pr: TrackedPr,
    pub threads: Vec<ReviewThread>,
}

/// The timestamp substituted when fetched data carries an unparseable
/// time. Also the "unset clock" sentinel the scoring engine rejects.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}
