//! Core data models used throughout askrepo.
//!
//! These types represent the documents, chunks, and retrieval hits that flow
//! through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};

/// Raw markdown file produced by the GitHub archive source before
/// normalization. `source_id` is the repo-relative path.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub source: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub content_type: String,
    pub body: String,
    pub metadata_json: String,
}

/// A sliding-window chunk of a document's body text.
///
/// `start_offset` is the character offset of the window within the body,
/// so overlapping chunks can be mapped back to their position.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub start_offset: i64,
    pub text: String,
    pub hash: String,
}

/// A retrieval hit returned by the search layer, consumed by both the
/// `search` CLI command and the agent's prompt assembly.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document_id: String,
    pub title: Option<String>,
    pub path: String,
    pub source_url: Option<String>,
    pub updated_at: i64,
    pub score: f64,
    pub snippet: String,
    pub chunk_text: String,
}

/// One turn of a chat conversation, as exchanged with the HTTP API.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// A source document cited in an agent answer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Citation {
    pub title: String,
    pub path: String,
    pub url: Option<String>,
}
