//! Periodic re-pull of the feeds and atomic snapshot publication.
//!
//! The [`RefreshCoordinator`] owns the published [`Snapshot`]. A refresh
//! fetches every configured feed, runs the [`Pipeline`] and swaps the snapshot
//! in one step; readers holding the previous `Arc<Snapshot>` keep a consistent
//! view. At most one refresh runs at a time: callers arriving while one is in
//! flight await the same shared future and receive the same outcome.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::EngineConfig;
use crate::diagnostics::Warning;
use crate::error::{EngineError, Result};
use crate::model::{EventId, NormalizedEvent, SelectionResult};
use crate::normalizer::{apply_hidden, HiddenSet};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::selector::select;

/// Retrieves raw feed text. Owns authentication, retries and timeouts.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// # Errors
    /// Returns [`EngineError::Network`] when the feed cannot be retrieved.
    async fn fetch(&self, location: &str) -> Result<String>;
}

/// The user's hidden-event identities. Persistence is the implementor's concern.
pub trait HiddenEventStore: Send + Sync {
    fn hidden_ids(&self) -> HiddenSet;
    fn hide(&self, id: EventId);
    fn unhide(&self, id: &EventId);
}

/// A [`HiddenEventStore`] that keeps identities in memory.
#[derive(Debug, Default)]
pub struct InMemoryHiddenStore {
    ids: RwLock<HiddenSet>,
}

impl InMemoryHiddenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: impl IntoIterator<Item = EventId>) -> Self {
        Self {
            ids: RwLock::new(ids.into_iter().collect()),
        }
    }
}

impl HiddenEventStore for InMemoryHiddenStore {
    fn hidden_ids(&self) -> HiddenSet {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn hide(&self, id: EventId) {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    fn unhide(&self, id: &EventId) {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// An immutable, fully normalized event set.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub events: Arc<[NormalizedEvent]>,
    /// When the events were built; `None` until the first successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Set when the latest refresh failed and `events` are left over from an
    /// earlier one.
    pub stale: bool,
    pub last_error: Option<String>,
    pub warnings: Arc<[Warning]>,
}

/// Result of one refresh, shared by every caller that joined it.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Published { events: usize, warnings: usize },
    Failed(EngineError),
}

impl RefreshOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, RefreshOutcome::Published { .. })
    }
}

/// Source of "now" for window computation.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct InFlight {
    generation: u64,
    current: Option<SharedRefresh>,
}

struct Inner {
    pipeline: Pipeline,
    fetcher: Arc<dyn FeedFetcher>,
    hidden: Arc<dyn HiddenEventStore>,
    clock: Clock,
    snapshot: RwLock<Arc<Snapshot>>,
    in_flight: Mutex<InFlight>,
}

/// Cheap to clone; clones share the snapshot and the in-flight refresh.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn FeedFetcher>,
        hidden: Arc<dyn HiddenEventStore>,
    ) -> Self {
        Self::with_clock(config, fetcher, hidden, Arc::new(Utc::now))
    }

    pub fn with_clock(
        config: EngineConfig,
        fetcher: Arc<dyn FeedFetcher>,
        hidden: Arc<dyn HiddenEventStore>,
        clock: Clock,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline: Pipeline::new(config),
                fetcher,
                hidden,
                clock,
                snapshot: RwLock::new(Arc::new(Snapshot::default())),
                in_flight: Mutex::new(InFlight::default()),
            }),
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot()
    }

    /// Select against the published snapshot and the current hidden set.
    pub fn select(&self, now: DateTime<Utc>) -> SelectionResult {
        let snapshot = self.snapshot();
        let hidden = self.inner.hidden.hidden_ids();
        select(&apply_hidden(&snapshot.events, &hidden), now)
    }

    pub fn hide(&self, id: EventId) {
        self.inner.hidden.hide(id);
    }

    pub fn unhide(&self, id: &EventId) {
        self.inner.hidden.unhide(id);
    }

    /// Refresh now, or join the refresh already in flight.
    pub async fn trigger_refresh(&self) -> RefreshOutcome {
        let refresh = {
            let mut in_flight = self.inner.lock_in_flight();
            match &in_flight.current {
                Some(running) => {
                    tracing::debug!("joining in-flight refresh");
                    running.clone()
                }
                None => {
                    in_flight.generation += 1;
                    let generation = in_flight.generation;
                    let inner = Arc::clone(&self.inner);
                    let refresh = async move {
                        let outcome = inner.refresh_once(generation).await;
                        inner.finish(generation);
                        outcome
                    }
                    .boxed()
                    .shared();
                    in_flight.current = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    /// Forget the in-flight refresh. Once every caller awaiting it is
    /// dropped, its partial work is discarded unpublished; a caller still
    /// awaiting it sees it finish, but it publishes only if no newer refresh
    /// has started in the meantime.
    fn abandon_in_flight(&self) {
        let mut in_flight = self.inner.lock_in_flight();
        if in_flight.current.take().is_some() {
            tracing::debug!("abandoned in-flight refresh");
        }
    }

    /// Refresh on the configured interval until `shutdown` flips to `true`
    /// (or its sender is dropped). `on_refresh` sees every outcome.
    pub async fn run<F>(&self, mut shutdown: watch::Receiver<bool>, mut on_refresh: F)
    where
        F: FnMut(&RefreshOutcome),
    {
        let mut ticker = tokio::time::interval(self.inner.pipeline.config().refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    self.abandon_in_flight();
                    break;
                }
                outcome = self.trigger_refresh() => on_refresh(&outcome),
            }
        }
        tracing::debug!("refresh loop stopped");
    }
}

impl Inner {
    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, generation: u64) {
        let mut in_flight = self.lock_in_flight();
        if in_flight.generation == generation {
            in_flight.current = None;
        }
    }

    async fn refresh_once(&self, generation: u64) -> RefreshOutcome {
        let now = (self.clock)();
        match self.build(now).await {
            Ok(output) => {
                let outcome = RefreshOutcome::Published {
                    events: output.events.len(),
                    warnings: output.warnings.len(),
                };
                self.publish(generation, |_| Snapshot {
                    events: output.events.into(),
                    refreshed_at: Some(now),
                    stale: false,
                    last_error: None,
                    warnings: output.warnings.into(),
                });
                tracing::info!(?outcome, "published calendar snapshot");
                outcome
            }
            Err(err) => {
                tracing::error!(%err, "refresh failed, keeping previous snapshot");
                self.publish(generation, |previous| Snapshot {
                    stale: true,
                    last_error: Some(err.to_string()),
                    ..previous.clone()
                });
                RefreshOutcome::Failed(err)
            }
        }
    }

    async fn build(&self, now: DateTime<Utc>) -> Result<PipelineOutput> {
        let feeds = &self.pipeline.config().feeds;
        let mut documents = Vec::with_capacity(feeds.len());
        for feed in feeds {
            documents.push(self.fetcher.fetch(feed).await?);
        }
        let hidden: HashSet<EventId> = self.hidden.hidden_ids();
        self.pipeline.run(&documents, &hidden, now)
    }

    /// Swap in the snapshot built from the current one, unless a newer
    /// refresh has started since `generation` did.
    fn publish(&self, generation: u64, next: impl FnOnce(&Snapshot) -> Snapshot) {
        let in_flight = self.lock_in_flight();
        if in_flight.generation != generation {
            tracing::debug!(generation, "superseded refresh not published");
            return;
        }
        let mut published = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let current = Arc::clone(&published);
        *published = Arc::new(next(&current));
    }
}
