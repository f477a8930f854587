//! In-memory `Store` backend.
//!
//! Fully functional (bury flags and rate-limit windows behave like the
//! real backend), used for demo mode and as the test double for the
//! poller and the API.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::traits::{BuriedPr, Store};
use crate::types::TrackedPr;

#[derive(Debug, Default)]
struct Inner {
    credential: Option<String>,
    rate_limited_until: Option<DateTime<Utc>>,
    last_fetched: Option<DateTime<Utc>>,
    prs: Vec<TrackedPr>,
    /// Bury flags survive `replace_prs` here the same way a row update
    /// survives in SQL: keyed by URL, merged back on read.
    buried: HashMap<String, DateTime<Utc>>,
}

/// In-memory store; state lives behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with demo PRs so the dashboard can be
    /// explored without a token. `username` becomes the author of the
    /// "own" fixture PR.
    pub fn with_demo_fixtures(username: &str) -> Self {
        let now = Utc::now();

        let own = TrackedPr {
            url: "https://github.com/acme/api/pull/101".to_string(),
            title: "feat: scaffolding script for a new service".to_string(),
            author: username.to_string(),
            repo_name: "api".to_string(),
            repo_owner: "acme".to_string(),
            repo_url: "https://github.com/acme/api".to_string(),
            last_updated: now,
            threads_actionable: 3,
            threads_waiting: 2,
            additions: 32,
            deletions: 15,
            ..Default::default()
        };

        let draft = TrackedPr {
            url: "https://github.com/acme/infrastructure/pull/58".to_string(),
            title: "chore: update license".to_string(),
            author: "channy".to_string(),
            repo_name: "infrastructure".to_string(),
            repo_owner: "acme".to_string(),
            repo_url: "https://github.com/acme/infrastructure".to_string(),
            is_draft: true,
            last_updated: now,
            additions: 32,
            deletions: 15,
            ..Default::default()
        };

        let approved = TrackedPr {
            url: "https://github.com/acme/web/pull/212".to_string(),
            title: "feature: add settings for maximum minutes of idling".to_string(),
            author: "bierden".to_string(),
            repo_name: "web".to_string(),
            repo_owner: "acme".to_string(),
            repo_url: "https://github.com/acme/web".to_string(),
            review_status: "APPROVED".to_string(),
            is_draft: true,
            last_updated: now,
            additions: 32,
            deletions: 15,
            ..Default::default()
        };

        let store = Self::new();
        {
            let mut inner = store.inner.lock().expect("memory store lock poisoned");
            inner.prs = vec![own, draft, approved];
            inner.last_fetched = Some(now);
        }
        store
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn credential(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().expect("memory store lock poisoned").credential.clone())
    }

    async fn set_credential(&self, token: &str) -> Result<(), StoreError> {
        self.inner.lock().expect("memory store lock poisoned").credential =
            Some(token.to_string());
        Ok(())
    }

    async fn rate_limited_until(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        match inner.rate_limited_until {
            Some(until) if until > now => Ok(Some(until)),
            _ => {
                inner.rate_limited_until = None;
                Ok(None)
            }
        }
    }

    async fn set_rate_limited_until(&self, until: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.lock().expect("memory store lock poisoned").rate_limited_until = Some(until);
        Ok(())
    }

    async fn last_fetched(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.inner.lock().expect("memory store lock poisoned").last_fetched)
    }

    async fn prs(&self) -> Result<Vec<TrackedPr>, StoreError> {
        Ok(self.inner.lock().expect("memory store lock poisoned").prs.clone())
    }

    async fn replace_prs(
        &self,
        prs: &[TrackedPr],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("memory store lock poisoned");
        let inner = &mut *guard;
        inner.prs = prs.to_vec();
        inner.buried = inner
            .prs
            .iter()
            .filter(|p| p.buried)
            .map(|p| (p.url.clone(), p.last_updated))
            .collect();
        inner.last_fetched = Some(fetched_at);
        Ok(())
    }

    async fn buried_prs(&self) -> Result<Vec<BuriedPr>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .buried
            .iter()
            .map(|(url, last_updated)| BuriedPr { url: url.clone(), last_updated: *last_updated })
            .collect())
    }

    async fn bury(&self, url: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("memory store lock poisoned");
        let inner = &mut *guard;
        if let Some(pr) = inner.prs.iter_mut().find(|p| p.url == url) {
            pr.buried = true;
            inner.buried.insert(url.to_string(), pr.last_updated);
        }
        Ok(())
    }

    async fn unbury(&self, url: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("memory store lock poisoned");
        let inner = &mut *guard;
        if let Some(pr) = inner.prs.iter_mut().find(|p| p.url == url) {
            pr.buried = false;
        }
        inner.buried.remove(url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_fixtures_include_an_own_pr() {
        let store = MemoryStore::with_demo_fixtures("demo");
        let prs = store.prs().await.unwrap();
        assert_eq!(prs.len(), 3);
        assert!(prs.iter().any(|p| p.author == "demo"));
        assert!(store.last_fetched().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bury_snapshot_tracks_last_updated_at_bury_time() {
        let store = MemoryStore::with_demo_fixtures("demo");
        let url = store.prs().await.unwrap()[0].url.clone();

        store.bury(&url).await.unwrap();
        let buried = store.buried_prs().await.unwrap();
        assert_eq!(buried.len(), 1);
        assert_eq!(buried[0].url, url);

        store.unbury(&url).await.unwrap();
        assert!(store.buried_prs().await.unwrap().is_empty());
    }
}
