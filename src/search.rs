//! Keyword retrieval over the chunk index.
//!
//! Queries the FTS5 table for chunk candidates, min-max normalizes the BM25
//! scores, and groups candidates by document keeping the best-scoring chunk
//! per document. The structured form ([`search_chunks`]) feeds the agent's
//! prompt assembly; [`run_search`] prints for the CLI.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::SearchHit;

/// Retrieve the top documents for a free-text question.
///
/// Returns at most `limit` hits ordered by score desc, updated_at desc,
/// document id asc. An empty or unmatchable query returns no hits.
pub async fn search_chunks(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    let match_expr = fts_query(query);
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }

    let candidates =
        fetch_candidates(pool, &match_expr, config.retrieval.candidate_k).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let normalized = normalize_scores(&candidates);

    // Group by document, keeping the highest-scoring chunk
    struct DocBest<'a> {
        score: f64,
        cand: &'a ChunkCandidate,
    }
    let mut doc_map: HashMap<&str, DocBest> = HashMap::new();
    for &(cand, score) in &normalized {
        let entry = doc_map
            .entry(cand.document_id.as_str())
            .or_insert(DocBest { score, cand });
        if score > entry.score {
            entry.score = score;
            entry.cand = cand;
        }
    }

    let mut hits = Vec::new();
    for best in doc_map.values() {
        let row = sqlx::query(
            "SELECT id, title, source_id, source_url, updated_at FROM documents WHERE id = ?",
        )
        .bind(&best.cand.document_id)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = row {
            hits.push(SearchHit {
                document_id: row.get("id"),
                title: row.get("title"),
                path: row.get("source_id"),
                source_url: row.get("source_url"),
                updated_at: row.get("updated_at"),
                score: best.score,
                snippet: best.cand.snippet.clone(),
                chunk_text: best.cand.text.clone(),
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.document_id.cmp(&b.document_id))
    });
    // A non-positive limit would wrap in the usize cast
    hits.truncate(limit.max(0) as usize);

    Ok(hits)
}

/// CLI entry point: run a search and print ranked results.
pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let final_limit = limit.unwrap_or(config.retrieval.final_limit).max(1);
    let hits = search_chunks(&pool, config, query, final_limit).await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let title = hit.title.as_deref().unwrap_or("(untitled)");
        let date = chrono::DateTime::from_timestamp(hit.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!("{}. [{:.2}] {}", i + 1, hit.score, title);
        println!("    path: {}", hit.path);
        if let Some(ref url) = hit.source_url {
            println!("    url: {}", url);
        }
        println!("    updated: {}", date);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!("    id: {}", hit.document_id);
        println!();
    }

    pool.close().await;
    Ok(())
}

// ============ Candidates ============

#[derive(Debug, Clone)]
struct ChunkCandidate {
    document_id: String,
    raw_score: f64,
    snippet: String,
    text: String,
}

async fn fetch_candidates(
    pool: &SqlitePool,
    match_expr: &str,
    candidate_k: i64,
) -> Result<Vec<ChunkCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT f.document_id, f.rank,
               snippet(chunks_fts, 3, '>>>', '<<<', '...', 48) AS snippet,
               c.text AS chunk_text
        FROM chunks_fts f
        JOIN chunks c ON c.id = f.chunk_id
        WHERE chunks_fts MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(match_expr)
    .bind(candidate_k)
    .fetch_all(pool)
    .await?;

    let candidates = rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            ChunkCandidate {
                document_id: row.get("document_id"),
                raw_score: -rank, // FTS5 rank is ascending-better; negate
                snippet: row.get("snippet"),
                text: row.get("chunk_text"),
            }
        })
        .collect();

    Ok(candidates)
}

/// Build an FTS5 MATCH expression from free text.
///
/// Questions arrive with punctuation FTS5 would treat as syntax, so the
/// query is reduced to its alphanumeric terms, each quoted, joined with OR
/// for recall (any matching term scores, BM25 ranks density).
fn fts_query(query: &str) -> String {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    terms.join(" OR ")
}

/// Min-max normalize raw scores to [0, 1]. A single candidate (or all-equal
/// scores) maps to 1.0.
fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<(&ChunkCandidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}
