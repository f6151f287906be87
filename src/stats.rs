//! Index and quota overview.
//!
//! Summarizes what's indexed (document and chunk counts, checkpoint age)
//! and how much Gemini quota the limiter has left. Used by `askrepo stats`
//! to confirm syncs worked and to see how close the assistant is to a
//! cooldown.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::ratelimit::RateLimiter;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let checkpoint_row = sqlx::query("SELECT cursor, updated_at FROM checkpoints WHERE source = 'github'")
        .fetch_optional(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("askrepo — Index Stats");
    println!("=====================");
    println!();
    println!(
        "  Repository:  {}/{} (branch {})",
        config.github.owner, config.github.repo, config.github.branch
    );
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);

    match checkpoint_row {
        Some(row) => {
            let cursor: String = row.get("cursor");
            let updated_at: i64 = row.get("updated_at");
            let when = chrono::DateTime::from_timestamp(updated_at, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| updated_at.to_string());
            println!("  Last sync:   {} (cursor {})", when, cursor);
        }
        None => println!("  Last sync:   never"),
    }

    println!();

    let mut limiter = RateLimiter::load(config.limits.clone(), config.limits_state_path());
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let quota = limiter.stats(now);

    println!("  Quota (minute): {}/{} requests", quota.minute_used, quota.minute_limit);
    println!("  Quota (day):    {}/{} requests", quota.daily_used, quota.daily_limit);
    println!(
        "  Tokens (minute): {}/{}",
        quota.tokens_used_last_minute, quota.tokens_per_minute
    );

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
