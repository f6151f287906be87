//! JSON interaction logs.
//!
//! Every answered question is written to its own JSON file under the
//! configured logs directory, named `{timestamp}_{uuid}.json`. Logging is
//! best-effort: a write failure is reported as a warning and the answer is
//! still returned to the user.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::agent::AgentReply;
use crate::config::Config;
use crate::models::Citation;

/// One logged question/answer interaction.
#[derive(Debug, Serialize)]
pub struct InteractionRecord<'a> {
    pub timestamp: String,
    pub model: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub small_talk: bool,
    pub citations: &'a [Citation],
    pub retrieval_scores: &'a [f64],
}

/// Write an interaction record, returning the path written. Callers treat
/// errors as non-fatal.
pub fn log_interaction(config: &Config, question: &str, reply: &AgentReply) -> Result<PathBuf> {
    let record = InteractionRecord {
        timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        model: &config.gemini.model,
        question,
        answer: &reply.text,
        small_talk: reply.small_talk,
        citations: &reply.citations,
        retrieval_scores: &reply.retrieval_scores,
    };

    write_record(config, &record)
}

fn write_record(config: &Config, record: &InteractionRecord<'_>) -> Result<PathBuf> {
    let dir = &config.logs.dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;

    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let path = dir.join(format!("{}_{}.json", stamp, Uuid::new_v4()));

    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write interaction log: {}", path.display()))?;

    Ok(path)
}

/// Log an interaction, demoting failures to a warning.
pub fn log_interaction_best_effort(config: &Config, question: &str, reply: &AgentReply) {
    match log_interaction(config, question, reply) {
        Ok(path) => tracing::debug!(path = %path.display(), "interaction logged"),
        Err(e) => tracing::warn!(error = %e, "failed to write interaction log"),
    }
}
