//! In-process store
//!
//! Backs tests and `--memory` runs. Faults can be queued per operation kind so
//! the partial-failure paths of categorize are reproducible.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use super::{Collection, Item, ItemKey, ItemStream, Store};
use crate::error::{Error, Result};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Store operation kinds that can carry an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Put,
    Delete,
    Transact,
    /// One page fetch of `query_all`
    Query,
}

/// Failure injected into the next call of an [`Op`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    Contention,
    /// Report the key as already gone without touching anything
    NotFound,
    /// Sleep before running the operation normally
    Stall(Duration),
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    items: BTreeMap<i64, (Collection, Vec<u8>)>,
    counters: HashMap<String, i64>,
    faults: HashMap<Op, VecDeque<Fault>>,
}

/// Mutex-guarded map store. The lock is never held across an await.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    /// Queue `fault` for the next `times` calls of `op`
    pub fn inject(&self, op: Op, fault: Fault, times: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            let queue = inner.faults.entry(op).or_default();
            queue.extend(std::iter::repeat(fault).take(times));
        }
    }

    /// Number of items currently in `collection`
    pub fn len(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.items.values().filter(|(c, _)| *c == collection).count())
            .unwrap_or(0)
    }

    /// Overwrite a counter directly, bypassing the transaction path
    pub fn force_counter(&self, name: &str, value: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.counters.insert(name.to_string(), value);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::unavailable("memory store lock poisoned"))
    }

    async fn apply_fault(&self, op: Op, subject: &str) -> Result<()> {
        let fault = self.lock()?.faults.get_mut(&op).and_then(VecDeque::pop_front);

        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => Err(Error::unavailable(format!(
                "injected failure on {:?} {}",
                op, subject
            ))),
            Some(Fault::Contention) => Err(Error::Contention {
                key: subject.to_string(),
            }),
            Some(Fault::NotFound) => Err(Error::not_found(subject.to_string())),
            Some(Fault::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn fetch_page(&self, collection: Collection, after: i64) -> Result<Vec<(ItemKey, Item)>> {
        self.apply_fault(Op::Query, collection.as_str()).await?;

        let inner = self.lock()?;
        let page = inner
            .items
            .range((after + 1)..)
            .filter(|(_, (c, _))| *c == collection)
            .take(self.page_size)
            .map(|(id, (c, value))| (ItemKey::new(*c, *id), Item::new(value.clone())))
            .collect();
        Ok(page)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &ItemKey) -> Result<Item> {
        self.apply_fault(Op::Get, &key.to_string()).await?;

        let inner = self.lock()?;
        match inner.items.get(&key.id) {
            Some((collection, value)) if *collection == key.collection => Ok(Item::new(value.clone())),
            _ => Err(Error::not_found(format!("item {}", key))),
        }
    }

    async fn put(&self, collection: Collection, item: Item) -> Result<ItemKey> {
        self.apply_fault(Op::Put, collection.as_str()).await?;

        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.insert(id, (collection, item.value));
        Ok(ItemKey::new(collection, id))
    }

    async fn delete(&self, key: &ItemKey) -> Result<()> {
        self.apply_fault(Op::Delete, &key.to_string()).await?;

        let mut inner = self.lock()?;
        match inner.items.get(&key.id) {
            Some((collection, _)) if *collection == key.collection => {
                inner.items.remove(&key.id);
                Ok(())
            }
            _ => Err(Error::not_found(format!("item {}", key))),
        }
    }

    fn query_all(&self, collection: Collection) -> ItemStream<'_> {
        let page_size = self.page_size;
        stream::try_unfold(Some(0i64), move |cursor| async move {
            let Some(after) = cursor else {
                return Ok(None);
            };
            let page = self.fetch_page(collection, after).await?;
            let next = if page.len() < page_size {
                None
            } else {
                page.last().map(|(key, _)| key.id)
            };
            Ok::<_, Error>(Some((stream::iter(page.into_iter().map(Ok::<_, Error>)), next)))
        })
        .try_flatten()
        .boxed()
    }

    async fn transact(&self, name: &str, apply: &(dyn Fn(i64) -> i64 + Send + Sync)) -> Result<i64> {
        self.apply_fault(Op::Transact, name).await?;

        let mut inner = self.lock()?;
        let current = inner.counters.get(name).copied().unwrap_or(0);
        let next = apply(current);
        inner.counters.insert(name.to_string(), next);
        Ok(next)
    }

    async fn read_counter(&self, name: &str) -> Result<Option<i64>> {
        let inner = self.lock()?;
        Ok(inner.counters.get(name).copied())
    }
}
