//! Postgres-backed store
//!
//! - Items live in `spamham_items`, keyed by a BIGSERIAL id
//! - Counters live in `spamham_counters`, one row per name
//! - `transact` row-locks the counter (`SELECT ... FOR UPDATE`) so concurrent
//!   adjustments serialize; a racing first insert surfaces as contention

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{Collection, Item, ItemKey, ItemStream, Store};
use crate::error::{Error, Result};

/// Default maximum connections for the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default rows fetched per cursor page.
const DEFAULT_PAGE_SIZE: i64 = 500;

/// SQLSTATEs that mean "lost a race, try again"
const CONTENTION_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "23505", // unique_violation (concurrent first insert of a counter)
];

/// Store over a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    page_size: i64,
}

impl PgStore {
    /// Connect with the default pool size.
    ///
    /// ```ignore
    /// let store = PgStore::connect("postgres://localhost/spamham").await?;
    /// ```
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_options(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit connection limit
    pub async fn connect_with_options(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| classify(e, "connect"))?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows per cursor page (clamped to at least 1)
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_page(&self, collection: Collection, after: i64) -> Result<Vec<(ItemKey, Item)>> {
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT id, value FROM spamham_items
            WHERE collection = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(collection.as_str())
        .bind(after)
        .bind(self.page_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, collection.as_str()))?;

        Ok(rows
            .into_iter()
            .map(|(id, value)| (ItemKey::new(collection, id), Item::new(value)))
            .collect())
    }
}

/// Map a sqlx failure onto the store error taxonomy
fn classify(err: sqlx::Error, subject: &str) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if CONTENTION_CODES.contains(&code.as_ref()) {
                return Error::Contention {
                    key: subject.to_string(),
                };
            }
        }
    }

    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            Error::unavailable(err.to_string())
        }
        other => Error::Database(other),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, key: &ItemKey) -> Result<Item> {
        let value: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT value FROM spamham_items WHERE id = $1 AND collection = $2",
        )
        .bind(key.id)
        .bind(key.collection.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, &key.to_string()))?;

        value
            .map(Item::new)
            .ok_or_else(|| Error::not_found(format!("item {}", key)))
    }

    async fn put(&self, collection: Collection, item: Item) -> Result<ItemKey> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO spamham_items (collection, value) VALUES ($1, $2) RETURNING id",
        )
        .bind(collection.as_str())
        .bind(item.value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, collection.as_str()))?;

        Ok(ItemKey::new(collection, id))
    }

    async fn delete(&self, key: &ItemKey) -> Result<()> {
        let result = sqlx::query("DELETE FROM spamham_items WHERE id = $1 AND collection = $2")
            .bind(key.id)
            .bind(key.collection.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, &key.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("item {}", key)));
        }
        Ok(())
    }

    fn query_all(&self, collection: Collection) -> ItemStream<'_> {
        let page_size = self.page_size;
        stream::try_unfold(Some(0i64), move |cursor| async move {
            let Some(after) = cursor else {
                return Ok(None);
            };
            let page = self.fetch_page(collection, after).await?;
            let next = if (page.len() as i64) < page_size {
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
        let mut tx = self.pool.begin().await.map_err(|e| classify(e, name))?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT count FROM spamham_counters WHERE name = $1 FOR UPDATE")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| classify(e, name))?;

        let next = apply(current.unwrap_or(0));

        // Absent row: plain INSERT so a concurrent creator fails with 23505
        // instead of silently overwriting.
        let statement = match current {
            Some(_) => "UPDATE spamham_counters SET count = $2 WHERE name = $1",
            None => "INSERT INTO spamham_counters (name, count) VALUES ($1, $2)",
        };
        sqlx::query(statement)
            .bind(name)
            .bind(next)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, name))?;

        tx.commit().await.map_err(|e| classify(e, name))?;
        Ok(next)
    }

    async fn read_counter(&self, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT count FROM spamham_counters WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::migrations;

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p spamham-core -- --ignored

    async fn test_store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PgStore::connect(&url).await.expect("pool creation failed");
        migrations::run(store.pool()).await.expect("migrations failed");
        store
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn put_get_delete_round_trip() {
        let store = test_store().await;
        let key = store
            .put(Collection::Pending, Item::new(r#"{"pg":true}"#))
            .await
            .unwrap();

        assert_eq!(store.get(&key).await.unwrap().value, br#"{"pg":true}"#.to_vec());
        store.delete(&key).await.unwrap();
        assert!(store.delete(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn concurrent_transacts_serialize() {
        let store = test_store().await;
        let name = format!("test-counter-{}", std::process::id());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    loop {
                        match store.transact(&name, &|c| c + 1).await {
                            Ok(_) => break,
                            Err(e) if e.is_transient() => continue,
                            Err(e) => panic!("transact failed: {e}"),
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.expect("task panicked");
        }

        assert_eq!(store.read_counter(&name).await.unwrap(), Some(10));
    }
}
