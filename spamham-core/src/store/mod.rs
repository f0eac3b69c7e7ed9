//! Store adapter - the transactional key-value seam
//!
//! Everything the queue and counter do goes through [`Store`]:
//! - get/put/delete of opaque items keyed by store-assigned ids
//! - a restartable cursor over one collection
//! - an atomic read-modify-write on a single counter record
//!
//! No multi-key atomicity is offered. Backends: [`PgStore`] and [`MemoryStore`].

pub mod memory;
pub mod migrations;
pub mod postgres;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use memory::{Fault, MemoryStore, Op};
pub use postgres::PgStore;

/// Named item collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Pending,
    Spam,
    Ham,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Spam => "spam",
            Self::Ham => "ham",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "spam" => Ok(Self::Spam),
            "ham" => Ok(Self::Ham),
            other => Err(Error::not_found(format!("collection '{}'", other))),
        }
    }
}

/// Terminal collections a pending item can be categorized into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Spam,
    Ham,
}

impl Label {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Spam => Collection::Spam,
            Self::Ham => Collection::Ham,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.collection().as_str()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spam" => Ok(Self::Spam),
            "ham" => Ok(Self::Ham),
            other => Err(Error::invalid_target(other)),
        }
    }
}

/// Store-assigned identity of an item.
///
/// Ids are strictly increasing per store and never reused, so a deleted
/// key can never alias a later item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub collection: Collection,
    pub id: i64,
}

impl ItemKey {
    pub fn new(collection: Collection, id: i64) -> Self {
        Self { collection, id }
    }

    /// Opaque external form handed to moderators
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_string())
    }

    /// Decode the opaque form produced by [`ItemKey::encode`]
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| Error::invalid_key(encoded, e.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| Error::invalid_key(encoded, "not utf-8"))?;

        let (collection, id) = text
            .split_once('/')
            .ok_or_else(|| Error::invalid_key(encoded, "missing separator"))?;
        let collection = collection
            .parse::<Collection>()
            .map_err(|_| Error::invalid_key(encoded, "unknown collection"))?;
        let id = id
            .parse::<i64>()
            .map_err(|_| Error::invalid_key(encoded, "id is not an integer"))?;

        Ok(Self { collection, id })
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Opaque payload, expected to already be a serialized JSON value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Lazy sequence of items in one collection
pub type ItemStream<'a> = BoxStream<'a, Result<(ItemKey, Item)>>;

/// Transactional key-value store.
///
/// Every method talks to the backing store and may fail with
/// `StoreUnavailable`/`Database`. Only `transact` is atomic, and only per
/// counter name.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &ItemKey) -> Result<Item>;

    async fn put(&self, collection: Collection, item: Item) -> Result<ItemKey>;

    /// `NotFound` when the key is already gone
    async fn delete(&self, key: &ItemKey) -> Result<()>;

    /// Fresh cursor over `collection`, in store-native order
    fn query_all(&self, collection: Collection) -> ItemStream<'_>;

    /// Atomically replace counter `name` with `apply(current)`.
    ///
    /// An absent counter is presented as 0. Returns the persisted value.
    /// Losing to a concurrent writer surfaces as `Error::Contention`.
    async fn transact(&self, name: &str, apply: &(dyn Fn(i64) -> i64 + Send + Sync)) -> Result<i64>;

    /// Current counter value without creating it
    async fn read_counter(&self, name: &str) -> Result<Option<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_key_round_trips_through_opaque_form() {
        let key = ItemKey::new(Collection::Pending, 42);
        let encoded = key.encode();
        assert!(!encoded.contains('/'));
        assert_eq!(ItemKey::decode(&encoded).unwrap(), key);
    }

    #[test]
    fn item_key_rejects_garbage() {
        assert!(matches!(
            ItemKey::decode("not base64 !!"),
            Err(Error::InvalidKey { .. })
        ));
        let wrong_collection = URL_SAFE_NO_PAD.encode("eggs/1");
        assert!(matches!(
            ItemKey::decode(&wrong_collection),
            Err(Error::InvalidKey { .. })
        ));
        let bad_id = URL_SAFE_NO_PAD.encode("pending/abc");
        assert!(matches!(
            ItemKey::decode(&bad_id),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn label_parsing() {
        assert_eq!("spam".parse::<Label>().unwrap(), Label::Spam);
        assert_eq!("ham".parse::<Label>().unwrap().collection(), Collection::Ham);
        assert!(matches!(
            "pending".parse::<Label>(),
            Err(Error::InvalidTarget { .. })
        ));
        assert!(matches!("".parse::<Label>(), Err(Error::InvalidTarget { .. })));
    }
}
