//! Classification cache.
//!
//! The [`CacheStore`] trait defines the fingerprint-keyed result cache the
//! classifier writes through, enabling pluggable backends (SQLite for
//! persistent runs, in-memory for tests and one-shot pipelines).
//!
//! Entries carry an absolute `expires_at`; expiry is lazy. A `get` that
//! finds an expired entry deletes it and reports a miss, so backends never
//! need a background sweeper. `purge_expired` exists for explicit
//! maintenance.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::clock::Clock;
use crate::db;
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{ClassificationResult, ResultSource, Tier};

/// A cached classification with its expiry deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: ClassificationResult,
    pub expires_at: DateTime<Utc>,
}

/// Fingerprint-keyed result cache.
///
/// `get` re-tags returned results as [`ResultSource::CacheHit`]; `put`
/// overwrites unconditionally (last write wins).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a non-expired result by fingerprint. Expired entries are
    /// removed on access and reported as a miss.
    async fn get(&self, fingerprint: &str) -> Result<Option<ClassificationResult>>;

    /// Store a result under its fingerprint, expiring `ttl_days` from now.
    async fn put(&self, result: &ClassificationResult, ttl_days: u32) -> Result<()>;

    /// Number of non-expired entries.
    async fn size(&self) -> Result<u64>;

    /// Delete every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;

    /// All non-expired results, ordered by document id. Feeds report and
    /// validation runs over previously classified documents.
    async fn all_results(&self) -> Result<Vec<ClassificationResult>>;
}

/// In-memory cache for tests and single-run pipelines.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<ClassificationResult>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap();
            match entries.get(fingerprint) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => {
                    let mut result = entry.result.clone();
                    result.source = ResultSource::CacheHit;
                    return Ok(Some(result));
                }
                Some(_) => {}
            }
        }
        // Entry exists but has expired: evict it.
        self.entries.write().unwrap().remove(fingerprint);
        Ok(None)
    }

    async fn put(&self, result: &ClassificationResult, ttl_days: u32) -> Result<()> {
        let expires_at = self.clock.now() + Duration::days(i64::from(ttl_days));
        self.entries.write().unwrap().insert(
            result.fingerprint.clone(),
            CacheEntry {
                result: result.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn size(&self) -> Result<u64> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap();
        Ok(entries.values().filter(|e| e.expires_at > now).count() as u64)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    async fn all_results(&self) -> Result<Vec<ClassificationResult>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap();
        let mut results: Vec<ClassificationResult> = entries
            .values()
            .filter(|e| e.expires_at > now)
            .map(|e| {
                let mut r = e.result.clone();
                r.source = ResultSource::CacheHit;
                r
            })
            .collect();
        results.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(results)
    }
}

/// SQLite-backed cache, shared across runs of the `triage` binary.
pub struct SqliteCache {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCache {
    /// Open (creating if needed) the cache database at `path`.
    pub async fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self { pool, clock })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Result<ClassificationResult> {
        let classified_at: i64 = row.get("classified_at");
        let classified_at = DateTime::from_timestamp(classified_at, 0)
            .ok_or_else(|| Error::CacheIo(format!("invalid classified_at {classified_at}")))?;
        let tier: String = row.get("tier");
        let tier = match tier.as_str() {
            "HIGH" => Tier::High,
            "MEDIUM" => Tier::Medium,
            "LOW" => Tier::Low,
            other => return Err(Error::CacheIo(format!("invalid tier '{other}'"))),
        };
        let confidence_score: i64 = row.get("confidence_score");
        Ok(ClassificationResult {
            document_id: row.get("document_id"),
            fingerprint: row.get("fingerprint"),
            category: row.get("category"),
            confidence_score: confidence_score.clamp(0, 100) as u8,
            tier,
            classified_at,
            source: ResultSource::CacheHit,
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<ClassificationResult>> {
        let now = self.clock.now().timestamp();
        let row = sqlx::query(
            "SELECT fingerprint, document_id, category, confidence_score, tier, classified_at, expires_at \
             FROM classifications WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let expires_at: i64 = row.get("expires_at");
        if expires_at <= now {
            sqlx::query("DELETE FROM classifications WHERE fingerprint = ?")
                .bind(fingerprint)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        Ok(Some(Self::row_to_result(&row)?))
    }

    async fn put(&self, result: &ClassificationResult, ttl_days: u32) -> Result<()> {
        let expires_at = (self.clock.now() + Duration::days(i64::from(ttl_days))).timestamp();
        sqlx::query(
            r#"
            INSERT INTO classifications
                (fingerprint, document_id, category, confidence_score, tier, classified_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                document_id = excluded.document_id,
                category = excluded.category,
                confidence_score = excluded.confidence_score,
                tier = excluded.tier,
                classified_at = excluded.classified_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&result.fingerprint)
        .bind(&result.document_id)
        .bind(&result.category)
        .bind(i64::from(result.confidence_score))
        .bind(result.tier.as_str())
        .bind(result.classified_at.timestamp())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn size(&self) -> Result<u64> {
        let now = self.clock.now().timestamp();
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM classifications WHERE expires_at > ?")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now().timestamp();
        let outcome = sqlx::query("DELETE FROM classifications WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected())
    }

    async fn all_results(&self) -> Result<Vec<ClassificationResult>> {
        let now = self.clock.now().timestamp();
        let rows = sqlx::query(
            "SELECT fingerprint, document_id, category, confidence_score, tier, classified_at, expires_at \
             FROM classifications WHERE expires_at > ? ORDER BY document_id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_result).collect()
    }
}

/// Create the cache backend named by the `[cache]` config.
pub async fn create_cache(
    config: &crate::config::CacheConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CacheStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCache::new(clock))),
        "sqlite" => Ok(Arc::new(SqliteCache::open(&config.path, clock).await?)),
        other => Err(Error::CacheIo(format!("unknown cache backend: {other}"))),
    }
}
