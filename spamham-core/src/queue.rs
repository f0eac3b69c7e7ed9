//! Moderation queue - ingest into pending, categorize into spam/ham
//!
//! Categorize is a four-step move that the store cannot make atomic:
//! 1. read the pending item
//! 2. write a copy into the target collection (new key)
//! 3. delete the original
//! 4. decrement the pending counter
//!
//! Step 2 always precedes step 3, so a failure can duplicate an item but never
//! lose one. Failures after step 2 are returned as `PartialCategorize` and left
//! for reconciliation.

use std::sync::Arc;

use serde::Serialize;
use serde_json::value::RawValue;

use crate::context::RequestContext;
use crate::counter::{CounterService, PENDING_COUNTER};
use crate::error::{Error, PartialCategorizeFailure, Result};
use crate::store::{Collection, Item, ItemKey, Label, Store};

/// Outcome of a successful ingest
#[derive(Debug)]
pub struct IngestReceipt {
    pub key: ItemKey,
    /// Set when the item was stored but the pending counter was not bumped
    pub counter_error: Option<Error>,
}

impl IngestReceipt {
    pub fn counted(&self) -> bool {
        self.counter_error.is_none()
    }
}

/// Outcome of a categorize that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CategorizeOutcome {
    /// Item now lives under `copy` in the target collection
    Moved {
        #[serde(serialize_with = "serialize_key")]
        copy: ItemKey,
    },
    /// A concurrent categorize removed the original first; nothing changed
    LostRace,
}

fn serialize_key<S: serde::Serializer>(key: &ItemKey, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&key.encode())
}

/// Ingest and categorize over a shared store
#[derive(Clone)]
pub struct ModerationQueue {
    store: Arc<dyn Store>,
    counter: CounterService,
}

impl ModerationQueue {
    pub fn new(store: Arc<dyn Store>, counter: CounterService) -> Self {
        Self { store, counter }
    }

    pub fn counter(&self) -> &CounterService {
        &self.counter
    }

    /// Store `payload` as a new pending item and bump the pending count.
    ///
    /// A counter failure after the write does not fail the ingest; it is
    /// logged and returned in the receipt.
    pub async fn ingest(&self, ctx: &RequestContext, payload: Vec<u8>) -> Result<IngestReceipt> {
        validate_payload(&payload)?;

        let key = ctx
            .bounded("put", self.store.put(Collection::Pending, Item::new(payload)))
            .await?;

        let counter_error = match self.counter.adjust(ctx, PENDING_COUNTER, 1).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    actor = ctx.actor(),
                    "Item ingested but pending counter not incremented"
                );
                Some(e)
            }
        };

        tracing::info!(key = %key, actor = ctx.actor(), "Item ingested");
        Ok(IngestReceipt { key, counter_error })
    }

    /// Categorize using the raw form values (`type` must be spam or ham)
    pub async fn categorize_raw(
        &self,
        ctx: &RequestContext,
        encoded_key: &str,
        target: &str,
    ) -> Result<CategorizeOutcome> {
        let label: Label = target.parse()?;
        let key = ItemKey::decode(encoded_key)?;
        self.categorize(ctx, key, label).await
    }

    /// Move pending item `key` into `label`'s collection.
    pub async fn categorize(
        &self,
        ctx: &RequestContext,
        key: ItemKey,
        label: Label,
    ) -> Result<CategorizeOutcome> {
        if key.collection != Collection::Pending {
            return Err(Error::not_found(format!("pending item {}", key)));
        }

        let item = ctx.bounded("get", self.store.get(&key)).await?;

        let copy = ctx
            .bounded("put", self.store.put(label.collection(), item))
            .await?;

        match ctx.bounded("delete", self.store.delete(&key)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                // Someone else moved it between our read and delete. They own
                // the decrement; drop our copy so the target holds one.
                tracing::info!(key = %key, copy = %copy, actor = ctx.actor(), "Lost categorize race");
                self.discard_copy(ctx, &copy).await;
                return Ok(CategorizeOutcome::LostRace);
            }
            Err(e) => {
                let failure = PartialCategorizeFailure::Duplicate {
                    original: key,
                    copy,
                    source: Box::new(e),
                };
                tracing::error!(error = %failure, actor = ctx.actor(), "Partial categorize failure");
                return Err(failure.into());
            }
        }

        if let Err(e) = self.counter.adjust(ctx, PENDING_COUNTER, -1).await {
            let failure = PartialCategorizeFailure::Miscount {
                original: key,
                copy,
                source: Box::new(e),
            };
            tracing::error!(error = %failure, actor = ctx.actor(), "Partial categorize failure");
            return Err(failure.into());
        }

        tracing::info!(key = %key, copy = %copy, label = %label, actor = ctx.actor(), "Item categorized");
        Ok(CategorizeOutcome::Moved { copy })
    }

    async fn discard_copy(&self, ctx: &RequestContext, copy: &ItemKey) {
        if let Err(e) = ctx.bounded("delete", self.store.delete(copy)).await {
            tracing::warn!(copy = %copy, error = %e, "Could not remove duplicate after lost race");
        }
    }
}

/// Reject payloads that would corrupt a JSON export
fn validate_payload(payload: &[u8]) -> Result<()> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::invalid_payload("empty payload"));
    }
    serde_json::from_slice::<&RawValue>(payload)
        .map_err(|e| Error::invalid_payload(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::store::{Fault, MemoryStore, Op};
    use std::time::Duration;

    fn queue(store: Arc<MemoryStore>) -> ModerationQueue {
        let counter = CounterService::new(store.clone(), RetryConfig::DEFAULT);
        ModerationQueue::new(store, counter)
    }

    async fn pending_count(store: &MemoryStore) -> i64 {
        store.read_counter(PENDING_COUNTER).await.unwrap().unwrap_or(0)
    }

    #[tokio::test]
    async fn ingest_writes_pending_and_counts() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();

        let receipt = q.ingest(&ctx, br#"{"text":"hi"}"#.to_vec()).await.unwrap();
        assert!(receipt.counted());
        assert_eq!(receipt.key.collection, Collection::Pending);
        assert_eq!(store.len(Collection::Pending), 1);
        assert_eq!(pending_count(&store).await, 1);
    }

    #[tokio::test]
    async fn ingest_rejects_non_json() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();

        let bad_payloads: [&[u8]; 4] = [b"", b"   ", b"not json", br#"{"a":1} trailing"#];
        for bad in bad_payloads {
            let err = q.ingest(&ctx, bad.to_vec()).await.unwrap_err();
            assert!(matches!(err, Error::InvalidPayload { .. }));
        }
        assert_eq!(store.len(Collection::Pending), 0);
        assert_eq!(pending_count(&store).await, 0);
    }

    #[tokio::test]
    async fn ingest_surfaces_counter_failure_without_failing() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        store.inject(Op::Transact, Fault::Unavailable, 1);

        let receipt = q
            .ingest(&RequestContext::background(), br#"{"a":1}"#.to_vec())
            .await
            .unwrap();
        assert!(!receipt.counted());
        assert_eq!(store.len(Collection::Pending), 1);
        // under-reports by one until reconciled
        assert_eq!(pending_count(&store).await, 0);
    }

    #[tokio::test]
    async fn ingest_put_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        store.inject(Op::Put, Fault::Unavailable, 1);

        let err = q
            .ingest(&RequestContext::background(), br#"{"a":1}"#.to_vec())
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(pending_count(&store).await, 0);
    }

    #[tokio::test]
    async fn categorize_moves_item_and_decrements() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();

        let outcome = q.categorize(&ctx, receipt.key, Label::Spam).await.unwrap();
        let CategorizeOutcome::Moved { copy } = outcome else {
            panic!("expected a move, got {:?}", outcome);
        };

        assert_eq!(copy.collection, Collection::Spam);
        assert_ne!(copy.id, receipt.key.id);
        assert_eq!(store.get(&copy).await.unwrap().value, br#"{"a":1}"#.to_vec());
        assert_eq!(store.len(Collection::Pending), 0);
        assert_eq!(store.len(Collection::Ham), 0);
        assert_eq!(pending_count(&store).await, 0);
    }

    #[tokio::test]
    async fn second_categorize_is_not_found_without_double_decrement() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let first = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();
        q.ingest(&ctx, br#"{"b":2}"#.to_vec()).await.unwrap();

        q.categorize(&ctx, first.key, Label::Ham).await.unwrap();
        let err = q.categorize(&ctx, first.key, Label::Ham).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.len(Collection::Ham), 1);
        assert_eq!(pending_count(&store).await, 1);
    }

    #[tokio::test]
    async fn invalid_target_mutates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();

        let err = q
            .categorize_raw(&ctx, &receipt.key.encode(), "pending")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget { .. }));
        assert_eq!(store.len(Collection::Pending), 1);
        assert_eq!(pending_count(&store).await, 1);
    }

    #[tokio::test]
    async fn categorize_raw_accepts_encoded_keys() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();

        let outcome = q
            .categorize_raw(&ctx, &receipt.key.encode(), "ham")
            .await
            .unwrap();
        assert!(matches!(outcome, CategorizeOutcome::Moved { .. }));
        assert_eq!(store.len(Collection::Ham), 1);

        let err = q.categorize_raw(&ctx, "%%%", "ham").await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn key_outside_pending_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();
        let CategorizeOutcome::Moved { copy } =
            q.categorize(&ctx, receipt.key, Label::Spam).await.unwrap()
        else {
            panic!("expected a move");
        };

        let err = q.categorize(&ctx, copy, Label::Ham).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.len(Collection::Spam), 1);
        assert_eq!(store.len(Collection::Ham), 0);
    }

    #[tokio::test]
    async fn failed_delete_leaves_duplicate_and_count_untouched() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();
        store.inject(Op::Delete, Fault::Unavailable, 1);

        let err = q.categorize(&ctx, receipt.key, Label::Spam).await.unwrap_err();
        assert!(matches!(
            err,
            Error::PartialCategorize(PartialCategorizeFailure::Duplicate { .. })
        ));

        // in both collections, counter not decremented
        assert_eq!(store.len(Collection::Pending), 1);
        assert_eq!(store.len(Collection::Spam), 1);
        assert_eq!(pending_count(&store).await, 1);

        // retrying the same key completes the move, one extra duplicate at most
        let outcome = q.categorize(&ctx, receipt.key, Label::Spam).await.unwrap();
        assert!(matches!(outcome, CategorizeOutcome::Moved { .. }));
        assert_eq!(store.len(Collection::Pending), 0);
        assert_eq!(store.len(Collection::Spam), 2);
        assert_eq!(pending_count(&store).await, 0);
    }

    #[tokio::test]
    async fn failed_decrement_reports_miscount() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();
        store.inject(Op::Transact, Fault::Unavailable, 1);

        let err = q.categorize(&ctx, receipt.key, Label::Ham).await.unwrap_err();
        assert!(matches!(
            err,
            Error::PartialCategorize(PartialCategorizeFailure::Miscount { .. })
        ));
        assert_eq!(store.len(Collection::Pending), 0);
        assert_eq!(store.len(Collection::Ham), 1);
        // over-reports by one
        assert_eq!(pending_count(&store).await, 1);
    }

    #[tokio::test]
    async fn lost_delete_race_is_success_without_decrement() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();
        store.inject(Op::Delete, Fault::NotFound, 1);

        let outcome = q.categorize(&ctx, receipt.key, Label::Spam).await.unwrap();
        assert_eq!(outcome, CategorizeOutcome::LostRace);
        assert_eq!(store.len(Collection::Spam), 0);
        assert_eq!(pending_count(&store).await, 1);
    }

    #[tokio::test]
    async fn failed_read_mutates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let ctx = RequestContext::background();
        let receipt = q.ingest(&ctx, br#"{"a":1}"#.to_vec()).await.unwrap();
        store.inject(Op::Get, Fault::Unavailable, 1);

        let err = q.categorize(&ctx, receipt.key, Label::Spam).await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(store.len(Collection::Pending), 1);
        assert_eq!(store.len(Collection::Spam), 0);
        assert_eq!(pending_count(&store).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_exceeds_deadline_and_mutates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let q = queue(store.clone());
        let receipt = q
            .ingest(&RequestContext::background(), br#"{"a":1}"#.to_vec())
            .await
            .unwrap();
        store.inject(Op::Get, Fault::Stall(Duration::from_secs(60)), 1);

        let ctx = RequestContext::background().with_timeout(Duration::from_secs(1));
        let err = q.categorize(&ctx, receipt.key, Label::Ham).await.unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded { op: "get" }));
        assert_eq!(store.len(Collection::Pending), 1);
        assert_eq!(store.len(Collection::Ham), 0);
        assert_eq!(pending_count(&store).await, 1);
    }

    #[test]
    fn outcome_serializes_with_opaque_key() {
        let copy = ItemKey::new(Collection::Spam, 9);
        let json = serde_json::to_value(CategorizeOutcome::Moved { copy }).unwrap();
        assert_eq!(json["outcome"], "moved");
        assert_eq!(json["copy"], copy.encode());

        let json = serde_json::to_value(CategorizeOutcome::LostRace).unwrap();
        assert_eq!(json["outcome"], "lost_race");
    }
}
