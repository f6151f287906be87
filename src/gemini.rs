//! Gemini API client.
//!
//! Calls the `generateContent` endpoint with the configured model. Requires
//! the `GOOGLE_API_KEY` environment variable.
//!
//! # Retry Strategy
//!
//! Transient failures use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeminiConfig;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============ Wire types ============

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// One message of a conversation passed to [`generate`].
#[derive(Debug, Clone)]
pub struct Message {
    /// `"user"` or `"model"`.
    pub role: String,
    pub text: String,
}

/// Call `generateContent` with a system instruction and conversation turns,
/// returning the first candidate's concatenated text.
pub async fn generate(
    config: &GeminiConfig,
    system_prompt: &str,
    messages: &[Message],
) -> Result<String> {
    let api_key = std::env::var("GOOGLE_API_KEY")
        .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;

    let url = format!("{}/{}:generateContent", API_BASE, config.model);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = GenerateRequest {
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part {
                text: system_prompt,
            }],
        }),
        contents: messages
            .iter()
            .map(|m| Content {
                role: Some(m.role.as_str()),
                parts: vec![Part { text: &m.text }],
            })
            .collect(),
    };

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("x-goog-api-key", &api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: GenerateResponse = response.json().await?;
                    return extract_text(json);
                }

                // Rate limited or server error: retry with backoff
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    tracing::warn!(status = %status, attempt, "Gemini API transient error");
                    last_err = Some(anyhow::anyhow!(
                        "Gemini API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Other client errors are not retryable
                let body_text = response.text().await.unwrap_or_default();
                bail!("Gemini API error {}: {}", status, body_text);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Gemini API request failed");
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Gemini request failed after retries")))
}

fn extract_text(resp: GenerateResponse) -> Result<String> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Gemini response contained no candidates"))?;

    let content = candidate
        .content
        .ok_or_else(|| anyhow::anyhow!("Gemini candidate contained no content"))?;

    let text: String = content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        bail!("Gemini candidate contained no text parts");
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_joins_parts() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), "Hello world");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(resp).is_err());
    }

    #[test]
    fn missing_content_is_an_error() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":null}]}"#).unwrap();
        assert!(extract_text(resp).is_err());
    }

    #[test]
    fn request_serializes_camel_case_fields() {
        let req = GenerateRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part { text: "be brief" }],
            }),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "hi" }],
            }],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"systemInstruction\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("\"role\":null"));
    }
}
