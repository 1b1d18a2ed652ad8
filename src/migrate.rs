use anyhow::Result;
use sqlx::SqlitePool;

/// Create the cache schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_collections (
            name TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // id is the content address url|chunk_index|start|end
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            site TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            fetched_at INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_chunks_url ON cache_chunks(collection, url)")
        .execute(pool)
        .await?;

    Ok(())
}
