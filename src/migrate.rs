use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

/// Create the cache schema if it does not exist. Safe to run on every
/// open.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    // Create classifications table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classifications (
            fingerprint TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence_score INTEGER NOT NULL,
            tier TEXT NOT NULL,
            classified_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_classifications_document_id ON classifications(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_classifications_expires_at ON classifications(expires_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.cache.path).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}
