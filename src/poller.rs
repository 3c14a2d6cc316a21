//! Background polling loop
//!
//! Keeps subscribed sheets warm so client polls are served from cache.
//! The loop only calls upstream while clients are active: a cycle is
//! skipped when nothing has recorded activity within the inactivity
//! timeout. One coalesced fetch per document covers all of that
//! document's subscribed tables; a failing document is logged and the
//! cycle moves on to the next one.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::fetch::SheetFetcher;
use crate::metrics::UsageMetrics;

/// Background task refreshing subscribed documents while clients are active.
pub struct BackgroundPoller {
    inner: Arc<PollerInner>,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

struct PollerInner {
    fetcher: Arc<SheetFetcher>,
    metrics: Arc<UsageMetrics>,
    poll_interval: Duration,
    inactivity_timeout: Duration,
    subscriptions: Mutex<HashMap<String, BTreeSet<String>>>,
    last_activity: Mutex<Option<Instant>>,
}

impl BackgroundPoller {
    pub fn new(
        fetcher: Arc<SheetFetcher>,
        metrics: Arc<UsageMetrics>,
        poll_interval: Duration,
        inactivity_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                fetcher,
                metrics,
                poll_interval,
                inactivity_timeout,
                subscriptions: Mutex::new(HashMap::new()),
                last_activity: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Subscribe a table for background refreshing and record activity.
    ///
    /// The subscription set only grows; stale subscriptions cost extra
    /// upstream-included ranges, nothing more.
    pub fn subscribe(&self, spreadsheet_id: &str, gid: &str) {
        lock(&self.inner.subscriptions)
            .entry(spreadsheet_id.to_string())
            .or_default()
            .insert(gid.to_string());
        self.touch();

        log::debug!("Subscribed sheet {spreadsheet_id}:{gid}");
    }

    /// Record client activity without subscribing.
    pub fn touch(&self) {
        *lock(&self.inner.last_activity) = Some(Instant::now());
    }

    /// The subscribed gids of one document (includes at least what
    /// `subscribe` added; used by the miss path to fetch the whole set).
    pub fn subscribed_gids(&self, spreadsheet_id: &str) -> BTreeSet<String> {
        lock(&self.inner.subscriptions)
            .get(spreadsheet_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of subscribed tables across all documents.
    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.subscriptions)
            .values()
            .map(BTreeSet::len)
            .sum()
    }

    /// Whether the loop is running and clients have been active recently.
    pub fn is_active(&self) -> bool {
        let running = lock(&self.task).is_some();
        running && self.inner.has_recent_activity()
    }

    /// Start the polling loop. Idempotent: a running loop is left alone.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(inner.poll_interval) => {
                        if !inner.has_recent_activity() {
                            continue;
                        }
                        inner.poll_all().await;
                    }
                }
            }
        });

        *task = Some((shutdown_tx, handle));
        log::info!("Background poller started");
    }

    /// Stop the polling loop and wait for the task to unwind, so shutdown
    /// never races a partially completed cycle.
    pub async fn stop(&self) {
        let stopped = lock(&self.task).take();
        if let Some((shutdown_tx, handle)) = stopped {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
            log::info!("Background poller stopped");
        }
    }
}

impl PollerInner {
    fn has_recent_activity(&self) -> bool {
        match *lock(&self.last_activity) {
            Some(last) => last.elapsed() < self.inactivity_timeout,
            None => false,
        }
    }

    async fn poll_all(&self) {
        // Snapshot under the lock, fetch outside it.
        let subscriptions: Vec<(String, BTreeSet<String>)> = lock(&self.subscriptions)
            .iter()
            .filter(|(_, gids)| !gids.is_empty())
            .map(|(id, gids)| (id.clone(), gids.clone()))
            .collect();

        for (spreadsheet_id, gids) in subscriptions {
            if let Err(err) = self.fetcher.fetch_and_cache(&spreadsheet_id, gids).await {
                self.metrics.record_error();
                log::warn!("Failed to refresh {spreadsheet_id}: {err}");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
