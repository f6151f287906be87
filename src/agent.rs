//! Question-answering agent.
//!
//! Glues the pipeline together for one question: a small-talk gate answers
//! greetings without touching retrieval or quota; everything else retrieves
//! the top chunks, builds a grounded prompt with the recent conversation,
//! and asks Gemini, charging the rate limiter for the call.
//!
//! Rate-limit refusals are returned as [`RateLimitExceeded`] inside the
//! error chain so callers (CLI, HTTP server) can render the cooldown
//! message to the user instead of treating it as a failure.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::gemini::{self, Message};
use crate::models::{ChatTurn, Citation, SearchHit};
use crate::ratelimit::{estimate_tokens, RateLimiter};
use crate::search::search_chunks;

/// How many prior turns of conversation are included in the prompt.
const HISTORY_TURNS: usize = 5;

/// The agent's reply to one user message.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub citations: Vec<Citation>,
    /// True when the small-talk gate answered without an LLM call.
    pub small_talk: bool,
    /// Normalized retrieval scores of the chunks given to the model,
    /// in prompt order. Empty for small talk.
    pub retrieval_scores: Vec<f64>,
}

/// Answer one user message given the conversation so far.
pub async fn answer(
    config: &Config,
    pool: &SqlitePool,
    limiter: &mut RateLimiter,
    history: &[ChatTurn],
    question: &str,
) -> Result<AgentReply> {
    if let Some(reply) = small_talk_reply(question) {
        return Ok(AgentReply {
            text: reply,
            citations: Vec::new(),
            small_talk: true,
            retrieval_scores: Vec::new(),
        });
    }

    let hits = search_chunks(pool, config, question, config.retrieval.context_chunks as i64)
        .await
        .context("retrieval failed")?;

    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    limiter.check(now)?;

    let system_prompt = build_system_prompt(config);
    let messages = build_messages(question, &hits, history);

    let prompt_tokens: u64 = messages.iter().map(|m| estimate_tokens(&m.text)).sum();

    let result = gemini::generate(&config.gemini, &system_prompt, &messages).await;

    // The request is charged whether or not the upstream call succeeded;
    // a failed call still consumed quota at the API.
    let answer_tokens = result.as_ref().map(|t| estimate_tokens(t)).unwrap_or(0);
    limiter.record(now, prompt_tokens + answer_tokens);

    let text = result?;
    let citations = citations_for(&hits);
    let retrieval_scores = hits.iter().map(|h| h.score).collect();

    Ok(AgentReply {
        text,
        citations,
        small_talk: false,
        retrieval_scores,
    })
}

/// Canned replies for greetings, farewells, and thanks. Anything else goes
/// to retrieval.
pub fn small_talk_reply(text: &str) -> Option<String> {
    const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon"];
    const FAREWELLS: &[&str] = &["bye", "goodbye", "see you", "later"];
    const THANKS: &[&str] = &["thanks", "thank you", "thx"];

    let lower = text.trim().to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let contains_phrase = |phrases: &[&str]| {
        phrases.iter().any(|p| {
            if p.contains(' ') {
                lower.contains(p)
            } else {
                words.contains(p)
            }
        })
    };

    // Only short messages count as small talk; "hi, how do I configure an
    // agent tool?" is a real question.
    if words.len() > 6 {
        return None;
    }

    if contains_phrase(GREETINGS) {
        Some("Hi there! Ask me anything about this repository's documentation.".to_string())
    } else if contains_phrase(FAREWELLS) {
        Some("Goodbye! Come back any time you have more questions.".to_string())
    } else if contains_phrase(THANKS) {
        Some("You're welcome! Do you have any more questions about the docs?".to_string())
    } else {
        None
    }
}

/// System prompt instructing the model to answer only from the retrieved
/// documentation and to cite sources as markdown links.
pub fn build_system_prompt(config: &Config) -> String {
    format!(
        "You are an assistant for the documentation of the GitHub repository {owner}/{repo}.\n\
         \n\
         Rules:\n\
         1. Base every answer on the documentation excerpts provided in the user message.\n\
         2. If the excerpts do not contain the answer, say so clearly instead of guessing.\n\
         3. Answer concisely and conversationally, staying on topic.\n\
         4. Cite the source files you used, formatted as [FILE PATH](FULL_GITHUB_LINK),\n\
            using the links given with each excerpt.",
        owner = config.github.owner,
        repo = config.github.repo,
    )
}

/// Assemble the conversation for Gemini: the last few turns verbatim, then
/// the current question with its retrieved excerpts inlined.
fn build_messages(question: &str, hits: &[SearchHit], history: &[ChatTurn]) -> Vec<Message> {
    let mut messages: Vec<Message> = history
        .iter()
        .rev()
        .take(HISTORY_TURNS)
        .rev()
        .map(|turn| Message {
            role: if turn.role == "assistant" {
                "model".to_string()
            } else {
                "user".to_string()
            },
            text: turn.content.clone(),
        })
        .collect();

    let mut prompt = String::new();
    if hits.is_empty() {
        prompt.push_str("No documentation excerpts matched this question.\n\n");
    } else {
        prompt.push_str("Documentation excerpts:\n\n");
        for hit in hits {
            let url = hit.source_url.as_deref().unwrap_or("");
            prompt.push_str(&format!("--- {} ({})\n{}\n\n", hit.path, url, hit.chunk_text));
        }
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);

    messages.push(Message {
        role: "user".to_string(),
        text: prompt,
    });

    messages
}

/// Distinct source documents that were given to the model, in score order.
fn citations_for(hits: &[SearchHit]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();
    for hit in hits {
        let citation = Citation {
            title: hit
                .title
                .clone()
                .unwrap_or_else(|| hit.path.clone()),
            path: hit.path.clone(),
            url: hit.source_url.clone(),
        };
        if !citations.contains(&citation) {
            citations.push(citation);
        }
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, score: f64) -> SearchHit {
        SearchHit {
            document_id: format!("id-{}", path),
            title: Some(path.to_string()),
            path: path.to_string(),
            source_url: Some(format!("https://github.com/o/r/blob/main/{}", path)),
            updated_at: 0,
            score,
            snippet: String::new(),
            chunk_text: format!("content of {}", path),
        }
    }

    #[test]
    fn greetings_get_canned_reply() {
        assert!(small_talk_reply("hi").is_some());
        assert!(small_talk_reply("Hello!").is_some());
        assert!(small_talk_reply("good morning").is_some());
        assert!(small_talk_reply("thanks a lot").is_some());
        assert!(small_talk_reply("bye").is_some());
    }

    #[test]
    fn questions_are_not_small_talk() {
        assert!(small_talk_reply("What is an AI agent?").is_none());
        assert!(small_talk_reply("how do I configure retrieval").is_none());
        // Long sentences never short-circuit, even if they contain a greeting
        assert!(
            small_talk_reply("hi, can you explain how the planning pattern works in detail?")
                .is_none()
        );
    }

    #[test]
    fn greeting_must_be_a_word_not_a_substring() {
        // "this" contains "hi" but is not a greeting
        assert!(small_talk_reply("this?").is_none());
    }

    #[test]
    fn messages_include_bounded_history() {
        let history: Vec<ChatTurn> = (0..8)
            .map(|i| ChatTurn {
                role: if i % 2 == 0 { "user" } else { "assistant" }.to_string(),
                content: format!("turn {}", i),
            })
            .collect();

        let messages = build_messages("question", &[], &history);
        // 5 history turns + the current question
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].text, "turn 3");
        assert_eq!(messages[1].role, "user"); // turn 4
        assert_eq!(messages[2].role, "model"); // turn 5 (assistant)
        assert!(messages.last().unwrap().text.ends_with("Question: question"));
    }

    #[test]
    fn prompt_inlines_excerpts_with_links() {
        let hits = vec![hit("docs/a.md", 1.0), hit("docs/b.md", 0.5)];
        let messages = build_messages("what is a?", &hits, &[]);
        let prompt = &messages.last().unwrap().text;
        assert!(prompt.contains("docs/a.md"));
        assert!(prompt.contains("https://github.com/o/r/blob/main/docs/b.md"));
        assert!(prompt.contains("content of docs/a.md"));
    }

    #[test]
    fn empty_retrieval_is_stated_in_prompt() {
        let messages = build_messages("anything", &[], &[]);
        assert!(messages[0].text.contains("No documentation excerpts"));
    }

    #[test]
    fn citations_deduplicate_documents() {
        let hits = vec![hit("docs/a.md", 1.0), hit("docs/a.md", 0.9), hit("docs/b.md", 0.5)];
        let citations = citations_for(&hits);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].path, "docs/a.md");
        assert_eq!(citations[1].path, "docs/b.md");
    }
}
