//! Ingestion pipeline orchestration.
//!
//! Coordinates the full sync flow: archive fetch → filter → document upsert →
//! chunking → FTS indexing. Supports incremental sync via checkpoints and
//! local archive files for offline runs.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::db;
use crate::github;
use crate::models::{Chunk, SourceItem};

pub async fn run_sync(
    config: &Config,
    archive: Option<&Path>,
    full: bool,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    let pool = db::connect(config).await?;

    let checkpoint: Option<i64> = if full {
        None
    } else {
        get_checkpoint(&pool, "github").await?
    };

    let archive_bytes = match archive {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read archive file: {}", path.display()))?,
        None => github::fetch_archive(&config.github).await?,
    };

    let mut items = github::scan_archive(config, &archive_bytes)?;

    // Skip files not modified since the checkpoint
    if let Some(cp) = checkpoint {
        items.retain(|item| item.updated_at.timestamp() > cp);
    }

    if let Some(lim) = limit {
        items.truncate(lim);
    }

    if dry_run {
        println!("sync {}/{} (dry-run)", config.github.owner, config.github.repo);
        println!("  items found: {}", items.len());
        let total_chunks: usize = items
            .iter()
            .map(|item| chunk_text("tmp", &item.body, config.chunking.size, config.chunking.step).len())
            .sum();
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let mut docs_upserted = 0u64;
    let mut chunks_written = 0u64;
    let mut max_updated: i64 = checkpoint.unwrap_or(0);

    for item in &items {
        let doc_id = upsert_document(&pool, item).await?;
        let chunks = chunk_text(
            &doc_id,
            &item.body,
            config.chunking.size,
            config.chunking.step,
        );
        let chunk_count = chunks.len() as u64;
        replace_chunks(&pool, &doc_id, item.title.as_deref(), &chunks).await?;

        docs_upserted += 1;
        chunks_written += chunk_count;

        let ts = item.updated_at.timestamp();
        if ts > max_updated {
            max_updated = ts;
        }
    }

    set_checkpoint(&pool, "github", max_updated).await?;

    println!("sync {}/{}", config.github.owner, config.github.repo);
    println!("  fetched: {} items", items.len());
    println!("  upserted documents: {}", docs_upserted);
    println!("  chunks written: {}", chunks_written);
    println!("  checkpoint: {}", max_updated);
    println!("ok");

    pool.close().await;
    Ok(())
}

async fn upsert_document(pool: &SqlitePool, item: &SourceItem) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(item.source.as_bytes());
    hasher.update(item.source_id.as_bytes());
    hasher.update(item.updated_at.timestamp().to_le_bytes());
    hasher.update(item.body.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    // Reuse the existing id on re-sync so chunks stay attached
    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE source = ? AND source_id = ?")
            .bind(&item.source)
            .bind(&item.source_id)
            .fetch_optional(pool)
            .await?;

    let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    sqlx::query(
        r#"
        INSERT INTO documents (id, source, source_id, source_url, title, author, created_at, updated_at, content_type, body, metadata_json, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, source_id) DO UPDATE SET
            source_url = excluded.source_url,
            title = excluded.title,
            author = excluded.author,
            updated_at = excluded.updated_at,
            content_type = excluded.content_type,
            body = excluded.body,
            metadata_json = excluded.metadata_json,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&doc_id)
    .bind(&item.source)
    .bind(&item.source_id)
    .bind(&item.source_url)
    .bind(&item.title)
    .bind(&item.author)
    .bind(item.created_at.timestamp())
    .bind(item.updated_at.timestamp())
    .bind(&item.content_type)
    .bind(&item.body)
    .bind(&item.metadata_json)
    .bind(&dedup_hash)
    .execute(pool)
    .await?;

    Ok(doc_id)
}

async fn replace_chunks(
    pool: &SqlitePool,
    document_id: &str,
    title: Option<&str>,
    chunks: &[Chunk],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, start_offset, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(chunk.start_offset)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO chunks_fts (chunk_id, document_id, title, text) VALUES (?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(title.unwrap_or(""))
        .bind(&chunk.text)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn get_checkpoint(pool: &SqlitePool, source: &str) -> Result<Option<i64>> {
    let result: Option<String> =
        sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE source = ?")
            .bind(source)
            .fetch_optional(pool)
            .await?;

    Ok(result.and_then(|s| s.parse::<i64>().ok()))
}

async fn set_checkpoint(pool: &SqlitePool, source: &str, cursor_val: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO checkpoints (source, cursor, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(source) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
        "#,
    )
    .bind(source)
    .bind(cursor_val.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
