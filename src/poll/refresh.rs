//! The refresh loop: waits for scheduler signals, fetches PRs, and
//! reports each outcome back to the scheduler and storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::github::PrSource;
use crate::github::triage::classify_threads;
use crate::poll::scheduler::PollScheduler;
use crate::store::Store;
use crate::types::FetchedPr;

/// Floor between successful fetches in seconds, independent of backoff
/// state. Protects against a burst of manual refresh requests.
const MIN_FETCH_SPACING_SECS: i64 = 59;

/// Hard bound on one fetch; an elapsed timeout counts as a server-class
/// transient failure.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives refreshes: exactly one of these runs, and at most one fetch
/// is ever in flight.
pub struct RefreshOrchestrator {
    scheduler: Arc<PollScheduler>,
    store: Arc<dyn Store>,
    source: Arc<dyn PrSource>,
    username: String,
}

impl RefreshOrchestrator {
    pub fn new(
        scheduler: Arc<PollScheduler>,
        store: Arc<dyn Store>,
        source: Arc<dyn PrSource>,
        username: impl Into<String>,
    ) -> Self {
        Self { scheduler, store, source, username: username.into() }
    }

    /// Consume scheduler signals until the scheduler stops or a fatal
    /// fetch error stops it.
    pub async fn run(self) {
        info!("refresh loop started");
        while self.scheduler.wait_for_signal().await {
            if !self.cycle().await {
                break;
            }
        }
        info!("refresh loop stopped");
    }

    /// One refresh cycle. Returns `false` only on a fatal outcome; the
    /// scheduler is already stopped by then.
    async fn cycle(&self) -> bool {
        let credential = match self.store.credential().await {
            Ok(Some(token)) => SecretString::from(token),
            Ok(None) => {
                debug!("no credential configured, skipping refresh");
                return true;
            }
            Err(err) => {
                warn!(%err, "could not read credential, skipping refresh");
                return true;
            }
        };

        let now = Utc::now();

        match self.store.rate_limited_until(now).await {
            Ok(Some(until)) => {
                info!(%until, "rate limit window still active, skipping refresh");
                return true;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%err, "could not read rate limit window, skipping refresh");
                return true;
            }
        }

        match self.store.last_fetched().await {
            Ok(Some(last)) if (now - last).num_seconds() < MIN_FETCH_SPACING_SECS => {
                debug!(%last, "last fetch too recent, skipping refresh");
                return true;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "could not read last fetch time, skipping refresh");
                return true;
            }
        }

        match timeout(FETCH_TIMEOUT, self.source.fetch_prs(&credential, &self.username)).await {
            Err(_) => {
                warn!("github fetch timed out");
                self.scheduler.on_server_error();
            }
            Ok(Err(FetchError::RateLimited { until })) => {
                if let Err(err) = self.store.set_rate_limited_until(until).await {
                    warn!(%err, "could not persist rate limit window");
                }
                self.scheduler.on_rate_limited();
            }
            Ok(Err(FetchError::Server(err))) => {
                warn!(%err, "server error from github");
                self.scheduler.on_server_error();
            }
            Ok(Err(FetchError::Client(err))) => {
                error!(%err, "client error from github, giving up until reconfigured");
                self.scheduler.stop();
                return false;
            }
            Ok(Ok(fetched)) => {
                self.scheduler.on_success();
                self.store_fetched(fetched).await;
            }
        }

        true
    }

    /// Classify each fetched PR's threads, carry over still-valid bury
    /// flags, and replace the stored collection wholesale.
    async fn store_fetched(&self, fetched: Vec<FetchedPr>) {
        let buried = match self.store.buried_prs().await {
            Ok(buried) => buried,
            Err(err) => {
                warn!(%err, "could not read buried prs, bury flags reset this cycle");
                Vec::new()
            }
        };

        let mut prs = Vec::with_capacity(fetched.len());
        for FetchedPr { mut pr, threads } in fetched {
            let counts = classify_threads(&pr.author, &self.username, &threads);
            pr.threads_actionable = counts.actionable;
            pr.threads_waiting = counts.waiting;

            if let Some(bury) = buried.iter().find(|b| b.url == pr.url) {
                // a bury holds only until the PR sees new activity
                pr.buried = pr.last_updated <= bury.last_updated;
            }

            prs.push(pr);
        }

        if let Err(err) = self.store.replace_prs(&prs, Utc::now()).await {
            warn!(%err, "could not store prs");
        }
    }
}
