//! Counter reconciliation
//!
//! Categorize and ingest can leave the pending counter off by one per partial
//! failure. Reconciliation recounts the pending collection and overwrites the
//! counter when they disagree. The count and the overwrite are not atomic with
//! concurrent adjustments, so a busy queue may need another pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use tokio::sync::watch;

use crate::context::RequestContext;
use crate::counter::{CounterService, PENDING_COUNTER};
use crate::error::Result;
use crate::store::{Collection, Store};

/// What one reconciliation pass found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Items actually in pending
    pub observed: i64,
    /// Counter value before the pass
    pub recorded: i64,
    /// `recorded - observed`
    pub drift: i64,
    /// Whether the counter was overwritten
    pub corrected: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    counter: CounterService,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, counter: CounterService) -> Self {
        Self { store, counter }
    }

    /// Recount pending and repair the counter if it drifted
    pub async fn reconcile(&self, ctx: &RequestContext) -> Result<ReconcileReport> {
        let observed = self.count_pending(ctx).await?;
        let recorded = self.counter.read(ctx, PENDING_COUNTER).await?;
        let drift = recorded - observed;

        let corrected = if drift != 0 {
            tracing::warn!(observed, recorded, drift, "Pending counter drift detected, correcting");
            self.counter.set(ctx, PENDING_COUNTER, observed).await?;
            true
        } else {
            tracing::debug!(observed, "Pending counter consistent");
            false
        };

        Ok(ReconcileReport {
            observed,
            recorded,
            drift,
            corrected,
            checked_at: Utc::now(),
        })
    }

    async fn count_pending(&self, ctx: &RequestContext) -> Result<i64> {
        let cursor = self.store.query_all(Collection::Pending);
        ctx.bounded("query", cursor.try_fold(0i64, |n, _| async move { Ok(n + 1) }))
            .await
    }

    /// Reconcile every `interval` until `shutdown` flips to true.
    ///
    /// Failures are logged and retried on the next tick.
    pub async fn run_periodic(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Reconciliation task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ctx = RequestContext::background().with_actor("reconciler");
                    if let Err(e) = self.reconcile(&ctx).await {
                        tracing::error!(error = %e, "Reconciliation pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reconciliation task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::store::{Fault, Item, MemoryStore, Op};

    fn reconciler(store: Arc<MemoryStore>) -> Reconciler {
        let counter = CounterService::new(store.clone(), RetryConfig::DEFAULT);
        Reconciler::new(store, counter)
    }

    #[tokio::test]
    async fn consistent_counter_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        store.put(Collection::Pending, Item::new("1")).await.unwrap();
        store.force_counter(PENDING_COUNTER, 1);

        let report = reconciler(store)
            .reconcile(&RequestContext::background())
            .await
            .unwrap();
        assert_eq!(report.drift, 0);
        assert!(!report.corrected);
    }

    #[tokio::test]
    async fn drift_is_repaired() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..3 {
            store.put(Collection::Pending, Item::new("1")).await.unwrap();
        }
        store.put(Collection::Spam, Item::new("1")).await.unwrap();
        store.force_counter(PENDING_COUNTER, 5);

        let report = reconciler(store.clone())
            .reconcile(&RequestContext::background())
            .await
            .unwrap();
        assert_eq!(report.observed, 3);
        assert_eq!(report.recorded, 5);
        assert_eq!(report.drift, 2);
        assert!(report.corrected);
        assert_eq!(store.read_counter(PENDING_COUNTER).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn missing_counter_is_created_when_items_exist() {
        let store = Arc::new(MemoryStore::new());
        store.put(Collection::Pending, Item::new("1")).await.unwrap();

        let report = reconciler(store.clone())
            .reconcile(&RequestContext::background())
            .await
            .unwrap();
        assert_eq!(report.drift, -1);
        assert_eq!(store.read_counter(PENDING_COUNTER).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn query_failure_leaves_counter_untouched() {
        let store = Arc::new(MemoryStore::new());
        store.force_counter(PENDING_COUNTER, 9);
        store.inject(Op::Query, Fault::Unavailable, 1);

        let err = reconciler(store.clone())
            .reconcile(&RequestContext::background())
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(store.read_counter(PENDING_COUNTER).await.unwrap(), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        store.put(Collection::Pending, Item::new("1")).await.unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler(store.clone()).run_periodic(Duration::from_secs(60), rx));
        // first tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.read_counter(PENDING_COUNTER).await.unwrap(), Some(1));

        tx.send(true).unwrap();
        handle.await.expect("task panicked");
    }
}
