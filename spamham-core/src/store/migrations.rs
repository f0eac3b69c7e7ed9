//! Schema for the Postgres store

use sqlx::PgPool;

use crate::error::Result;

/// Create item and counter tables if missing
pub async fn run(pool: &PgPool) -> Result<()> {
    tracing::info!("Running spamham migrations...");

    // Items of every collection share one table; BIGSERIAL ids are never reused
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spamham_items (
            id BIGSERIAL PRIMARY KEY,
            collection TEXT NOT NULL,
            value BYTEA NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_spamham_items_collection
        ON spamham_items(collection, id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spamham_counters (
            name TEXT PRIMARY KEY,
            count BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Spamham migrations complete");
    Ok(())
}
