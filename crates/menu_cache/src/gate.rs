//! Staleness gate.
//!
//! Every read checks the snapshot age. A stale snapshot is still returned
//! immediately; at most one background crawl is launched to replace it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{Error, MenuCache};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::crawl::{CrawlOrchestrator, CrawlSummary};
use crate::store::CacheStore;

/// What a refresh request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Snapshot younger than the threshold; nothing launched.
    Fresh,
    /// A background crawl was started.
    Launched,
    /// A crawl was already running; nothing launched.
    AlreadyRunning,
    /// Ran a crawl to completion and published it.
    Completed(CrawlSummary),
    /// Waited for a crawl someone else had started.
    JoinedInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Fresh,
    StaleRefreshPending,
    StaleRefreshInFlight,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::Fresh => "fresh",
            GateState::StaleRefreshPending => "stale",
            GateState::StaleRefreshInFlight => "refreshing",
        };
        f.write_str(s)
    }
}

#[derive(Default)]
struct InFlight {
    running: AtomicBool,
    done: Notify,
}

/// Held for the lifetime of one crawl. Dropping it frees the slot, even if
/// the crawl task panicked.
struct SlotGuard(Arc<InFlight>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        self.0.done.notify_waiters();
    }
}

#[derive(Clone)]
pub struct StalenessGate {
    store: Arc<CacheStore>,
    orchestrator: Arc<CrawlOrchestrator>,
    max_age: Duration,
    in_flight: Arc<InFlight>,
}

impl StalenessGate {
    pub fn new(store: Arc<CacheStore>, orchestrator: Arc<CrawlOrchestrator>, max_age: Duration) -> Self {
        Self {
            store,
            orchestrator,
            max_age,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Current snapshot, launching a refresh first if it is stale.
    pub fn read_snapshot(&self) -> Arc<MenuCache> {
        self.maybe_refresh();
        self.store.read()
    }

    pub fn maybe_refresh(&self) -> RefreshDecision {
        self.maybe_refresh_at(Utc::now())
    }

    /// Staleness check against an explicit clock. Never waits.
    ///
    /// The slot is claimed before the snapshot is inspected, so a crawl that
    /// published just before the claim is always seen.
    pub fn maybe_refresh_at(&self, now: DateTime<Utc>) -> RefreshDecision {
        let slot = self.try_claim();
        let stale = self.store.read().is_stale(now, self.max_age.as_secs());

        match (slot, stale) {
            (_, false) => RefreshDecision::Fresh,
            (Some(slot), true) => {
                info!("Menu cache stale, launching background crawl");
                self.spawn_crawl(slot);
                RefreshDecision::Launched
            }
            (None, true) => RefreshDecision::AlreadyRunning,
        }
    }

    /// Crawl regardless of staleness.
    ///
    /// With `wait`, returns once the crawl (ours or the one already running)
    /// has finished.
    pub async fn force_refresh(&self, wait: bool) -> Result<RefreshDecision, Error> {
        let Some(slot) = self.try_claim() else {
            if wait {
                self.wait_idle().await;
                return Ok(RefreshDecision::JoinedInFlight);
            }
            return Ok(RefreshDecision::AlreadyRunning);
        };

        info!("Forced crawl requested (wait={})", wait);
        let handle = self.spawn_crawl(slot);
        if !wait {
            return Ok(RefreshDecision::Launched);
        }

        match handle.await {
            Ok(result) => result.map(RefreshDecision::Completed),
            Err(e) => Err(Error::Other(format!("crawl task aborted: {}", e))),
        }
    }

    pub fn state(&self) -> GateState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> GateState {
        if !self.store.read().is_stale(now, self.max_age.as_secs()) {
            GateState::Fresh
        } else if self.is_refreshing() {
            GateState::StaleRefreshInFlight
        } else {
            GateState::StaleRefreshPending
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.running.load(Ordering::Acquire)
    }

    /// Resolves once no crawl is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.done.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            if !self.is_refreshing() {
                return;
            }
            notified.await;
        }
    }

    /// Run one crawl inline and publish it. Callers must hold the slot.
    async fn refresh_now(&self) -> Result<CrawlSummary, Error> {
        let report = match self.orchestrator.run().await {
            Ok(report) => report,
            Err(e) => {
                error!("Menu crawl failed, keeping previous snapshot: {}", e);
                return Err(e);
            }
        };

        let days = report.cache.dates.len();
        if let Err(e) = self.store.replace(report.cache).await {
            warn!("Published new snapshot but failed to persist it: {}", e);
        }
        info!("Published menu snapshot ({} days)", days);

        Ok(report.summary)
    }

    fn try_claim(&self) -> Option<SlotGuard> {
        self.in_flight
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard(Arc::clone(&self.in_flight)))
    }

    fn spawn_crawl(&self, slot: SlotGuard) -> tokio::task::JoinHandle<Result<CrawlSummary, Error>> {
        let gate = self.clone();
        tokio::spawn(async move {
            let _slot = slot;
            gate.refresh_now().await
        })
    }
}
