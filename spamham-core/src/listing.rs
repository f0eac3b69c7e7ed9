//! Listing and export of collections
//!
//! Reads never coordinate with ingest/categorize; each call opens a fresh
//! cursor and sees whatever the store returns at that moment.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::context::RequestContext;
use crate::counter::{CounterService, PENDING_COUNTER};
use crate::error::{Error, Result};
use crate::store::{Collection, ItemKey, Store};

/// Separator between exported payloads
const EXPORT_SEPARATOR: &[u8] = b", ";

/// Next item to moderate plus the live pending count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peek {
    pub key: ItemKey,
    pub value: Vec<u8>,
    pub count: i64,
}

#[derive(Serialize)]
struct PeekBody<'a> {
    key: String,
    value: &'a RawValue,
    count: i64,
}

impl Peek {
    /// `{"key":"<opaque>","value":<payload verbatim>,"count":<n>}`
    pub fn to_json(&self) -> Result<String> {
        let text = std::str::from_utf8(&self.value)
            .map_err(|_| Error::invalid_payload(format!("item {} is not utf-8", self.key)))?;
        let value: &RawValue = serde_json::from_str(text)
            .map_err(|e| Error::invalid_payload(format!("item {}: {}", self.key, e)))?;

        serde_json::to_string(&PeekBody {
            key: self.key.encode(),
            value,
            count: self.count,
        })
        .map_err(|e| Error::invalid_payload(e.to_string()))
    }
}

/// Read side of the queue
#[derive(Clone)]
pub struct Listing {
    store: Arc<dyn Store>,
    counter: CounterService,
}

impl Listing {
    pub fn new(store: Arc<dyn Store>, counter: CounterService) -> Self {
        Self { store, counter }
    }

    /// Every payload in `collection`, in store order
    pub async fn list(&self, ctx: &RequestContext, collection: Collection) -> Result<Vec<Vec<u8>>> {
        let mut cursor = self.store.query_all(collection);
        let mut payloads = Vec::new();

        while let Some(next) = ctx.bounded("query", async { Ok(cursor.next().await) }).await? {
            let (_, item) = next?;
            payloads.push(item.value);
        }

        tracing::debug!(collection = %collection, count = payloads.len(), "Collection listed");
        Ok(payloads)
    }

    /// `collection` as a JSON array literal
    pub async fn export_json(&self, ctx: &RequestContext, collection: Collection) -> Result<Vec<u8>> {
        let payloads = self.list(ctx, collection).await?;
        Ok(render_json_array(payloads.iter().map(Vec::as_slice)))
    }

    /// One item of `collection` with the current pending count, or `None`
    pub async fn peek_one(&self, ctx: &RequestContext, collection: Collection) -> Result<Option<Peek>> {
        let first = {
            let mut cursor = self.store.query_all(collection);
            ctx.bounded("query", async { Ok(cursor.next().await) }).await?
        };

        let Some(first) = first else {
            return Ok(None);
        };
        let (key, item) = first?;
        let count = self.counter.read(ctx, PENDING_COUNTER).await?;

        Ok(Some(Peek {
            key,
            value: item.value,
            count,
        }))
    }
}

/// Join payloads verbatim as `[p1, p2, ...]`; `[]` when empty
pub fn render_json_array<'a, I>(payloads: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = vec![b'['];
    for (i, payload) in payloads.into_iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(EXPORT_SEPARATOR);
        }
        out.extend_from_slice(payload);
    }
    out.push(b']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::store::{Fault, Item, MemoryStore, Op};

    fn listing(store: Arc<MemoryStore>) -> Listing {
        let counter = CounterService::new(store.clone(), RetryConfig::DEFAULT);
        Listing::new(store, counter)
    }

    #[test]
    fn empty_array_has_no_separators() {
        assert_eq!(render_json_array(std::iter::empty()), b"[]".to_vec());
    }

    #[test]
    fn single_payload_is_bare() {
        assert_eq!(render_json_array([&br#"{"a":1}"#[..]]), br#"[{"a":1}]"#.to_vec());
    }

    #[tokio::test]
    async fn export_of_empty_collection_is_brackets() {
        let l = listing(Arc::new(MemoryStore::new()));
        let out = l
            .export_json(&RequestContext::background(), Collection::Spam)
            .await
            .unwrap();
        assert_eq!(out, b"[]".to_vec());
    }

    #[tokio::test]
    async fn export_joins_with_comma_space() {
        let store = Arc::new(MemoryStore::new());
        for payload in [r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#] {
            store.put(Collection::Ham, Item::new(payload)).await.unwrap();
        }
        store.put(Collection::Spam, Item::new(r#"{"z":0}"#)).await.unwrap();

        let l = listing(store);
        let out = l
            .export_json(&RequestContext::background(), Collection::Ham)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(", ").count(), 2);

        let parsed: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
        let mut parsed: Vec<String> = parsed.iter().map(|v| v.to_string()).collect();
        parsed.sort();
        assert_eq!(parsed, vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]);
    }

    #[tokio::test]
    async fn list_spans_multiple_pages() {
        let store = Arc::new(MemoryStore::with_page_size(3));
        for i in 0..10 {
            store.put(Collection::Spam, Item::new(i.to_string())).await.unwrap();
        }
        let l = listing(store);
        let items = l.list(&RequestContext::background(), Collection::Spam).await.unwrap();
        assert_eq!(items.len(), 10);
    }

    #[tokio::test]
    async fn cursor_failure_aborts_listing() {
        let store = Arc::new(MemoryStore::with_page_size(2));
        for i in 0..5 {
            store.put(Collection::Spam, Item::new(i.to_string())).await.unwrap();
        }
        store.inject(Op::Query, Fault::Unavailable, 1);

        let l = listing(store);
        let err = l
            .list(&RequestContext::background(), Collection::Spam)
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn peek_on_empty_is_none() {
        let l = listing(Arc::new(MemoryStore::new()));
        let peek = l
            .peek_one(&RequestContext::background(), Collection::Pending)
            .await
            .unwrap();
        assert!(peek.is_none());
    }

    #[tokio::test]
    async fn peek_returns_item_and_live_count() {
        let store = Arc::new(MemoryStore::new());
        let key = store
            .put(Collection::Pending, Item::new(r#"{"text":"buy now"}"#))
            .await
            .unwrap();
        store.force_counter(PENDING_COUNTER, 4);

        let l = listing(store);
        let peek = l
            .peek_one(&RequestContext::background(), Collection::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(peek.key, key);
        assert_eq!(peek.count, 4);

        let json: serde_json::Value = serde_json::from_str(&peek.to_json().unwrap()).unwrap();
        assert_eq!(json["key"], key.encode());
        assert_eq!(json["value"]["text"], "buy now");
        assert_eq!(json["count"], 4);
    }

    #[test]
    fn peek_embeds_payload_verbatim() {
        let peek = Peek {
            key: ItemKey::new(Collection::Pending, 1),
            value: br#"{"b": 2,  "a": 1}"#.to_vec(),
            count: 0,
        };
        let json = peek.to_json().unwrap();
        assert!(json.contains(r#""value":{"b": 2,  "a": 1}"#));
    }
}
