//! Cache statistics and health overview.
//!
//! Provides a quick summary of what's stored: live and expired entry
//! counts, per-tier and per-category breakdowns, and the database size.
//! Used by `triage cache stats` to give confidence that classification
//! runs are landing in the cache as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Per-category breakdown of live cache entries.
struct CategoryStats {
    category: String,
    count: i64,
}

/// Run the cache stats command: query the database and print a summary.
pub async fn run_cache_stats(config: &Config) -> Result<()> {
    if config.cache.backend != "sqlite" {
        println!(
            "Cache backend is \"{}\"; only the sqlite backend keeps statistics between runs.",
            config.cache.backend
        );
        return Ok(());
    }

    let pool = db::connect(&config.cache.path).await?;
    migrate::ensure_schema(&pool).await?;

    let now = chrono::Utc::now().timestamp();

    let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classifications")
        .fetch_one(&pool)
        .await?;

    let live_entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM classifications WHERE expires_at > ?")
            .bind(now)
            .fetch_one(&pool)
            .await?;

    let newest_ts: Option<i64> =
        sqlx::query_scalar("SELECT MAX(classified_at) FROM classifications WHERE expires_at > ?")
            .bind(now)
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.cache.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Doc Triage — Cache Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.cache.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!(
        "  Entries:     {} live / {} expired",
        live_entries,
        total_entries - live_entries
    );
    println!(
        "  Last run:    {}",
        match newest_ts {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );

    // Per-tier breakdown of live entries
    let tier_rows = sqlx::query(
        "SELECT tier, COUNT(*) AS entry_count FROM classifications \
         WHERE expires_at > ? GROUP BY tier ORDER BY entry_count DESC",
    )
    .bind(now)
    .fetch_all(&pool)
    .await?;

    if !tier_rows.is_empty() {
        println!();
        println!("  By tier:");
        for row in &tier_rows {
            let tier: String = row.get("tier");
            let count: i64 = row.get("entry_count");
            println!("  {:<12} {:>6}", tier, count);
        }
    }

    // Per-category breakdown of live entries
    let category_rows = sqlx::query(
        "SELECT category, COUNT(*) AS entry_count FROM classifications \
         WHERE expires_at > ? GROUP BY category ORDER BY entry_count DESC, category",
    )
    .bind(now)
    .fetch_all(&pool)
    .await?;

    let category_stats: Vec<CategoryStats> = category_rows
        .iter()
        .map(|row| CategoryStats {
            category: row.get("category"),
            count: row.get("entry_count"),
        })
        .collect();

    if !category_stats.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<24} {:>6}", "CATEGORY", "COUNT");
        println!("  {}", "-".repeat(32));
        for s in &category_stats {
            println!("  {:<24} {:>6}", s.category, s.count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
