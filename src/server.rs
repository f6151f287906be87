//! Chat HTTP server.
//!
//! Serves the embedded single-page chat UI and a small JSON API over the
//! indexed documentation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Embedded chat UI |
//! | `POST` | `/api/chat` | Answer one message (with client-held history) |
//! | `GET`  | `/api/stats` | Rate-limit quota usage |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "Please wait 4.2s before the next request." } }
//! ```
//!
//! Codes: `bad_request` (400), `rate_limited` (429), `upstream_error` (502),
//! `internal` (500). Rate-limit rejections carry the human-readable cooldown
//! message the UI shows directly.
//!
//! # Concurrency
//!
//! The rate limiter sits behind a `tokio::sync::Mutex`, so outbound Gemini
//! calls are serialized against the quota; the web framework's own event
//! loop drives everything else.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::agent;
use crate::config::Config;
use crate::db;
use crate::logs;
use crate::models::{ChatTurn, Citation};
use crate::ratelimit::{QuotaStats, RateLimiter, RateLimitExceeded};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    limiter: Arc<Mutex<RateLimiter>>,
}

/// Start the chat server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let limiter = RateLimiter::load(config.limits.clone(), config.limits_state_path());

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        limiter: Arc::new(Mutex::new(limiter)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_index))
        .route("/api/chat", post(handle_chat))
        .route("/api/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("askrepo chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn rate_limited(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "rate_limited".to_string(),
        message: message.into(),
    }
}

/// Map agent errors to the contract: limiter refusals become 429 with the
/// cooldown message, upstream API failures become 502, the rest 500.
fn classify_agent_error(err: anyhow::Error) -> AppError {
    if let Some(limit) = err.downcast_ref::<RateLimitExceeded>() {
        return rate_limited(limit.to_string());
    }

    let msg = err.to_string();
    if msg.contains("Gemini API") || msg.contains("GOOGLE_API_KEY") {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "upstream_error".to_string(),
            message: msg,
        }
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: msg,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/stats ============

async fn handle_stats(State(state): State<AppState>) -> Json<QuotaStats> {
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let mut limiter = state.limiter.lock().await;
    Json(limiter.stats(now))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    citations: Vec<Citation>,
    small_talk: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    // Hold the limiter across the whole call so quota checks and outbound
    // requests cannot interleave.
    let mut limiter = state.limiter.lock().await;
    let reply = agent::answer(
        &state.config,
        &state.pool,
        &mut limiter,
        &req.history,
        &req.message,
    )
    .await
    .map_err(classify_agent_error)?;
    drop(limiter);

    logs::log_interaction_best_effort(&state.config, &req.message, &reply);

    Ok(Json(ChatResponse {
        reply: reply.text,
        citations: reply.citations,
        small_talk: reply.small_talk,
    }))
}


// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

/// Embedded chat UI: plain HTML/JS, renders citations as links, shows quota
/// usage and cooldown warnings from the 429 error body.
const CHAT_PAGE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>askrepo</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; }
  #messages { min-height: 300px; }
  .msg { border-radius: 12px; padding: .6rem .9rem; margin: .4rem 0; white-space: pre-wrap; }
  .msg.user { background: #dcf8c6; margin-left: 20%; }
  .msg.assistant { background: #e8eaf6; margin-right: 20%; }
  .msg.warn { background: #fff3cd; font-style: italic; }
  .cites { font-size: .85em; margin-top: .4rem; }
  #quota { color: #666; font-size: .85em; margin-bottom: 1rem; }
  form { display: flex; gap: .5rem; margin-top: 1rem; }
  input[type=text] { flex: 1; padding: .5rem; }
</style>
</head>
<body>
<h1>askrepo</h1>
<div id="quota"></div>
<div id="messages"></div>
<form id="chat">
  <input type="text" id="prompt" placeholder="Ask about the documentation..." autocomplete="off">
  <button type="submit">Send</button>
</form>
<script>
const history = [];

function addMsg(cls, text, citations) {
  const div = document.createElement('div');
  div.className = 'msg ' + cls;
  div.textContent = text;
  if (citations && citations.length) {
    const c = document.createElement('div');
    c.className = 'cites';
    c.append('Sources: ');
    citations.forEach((cite, i) => {
      if (i) c.append(', ');
      const a = document.createElement('a');
      a.href = cite.url || '#';
      a.textContent = cite.path;
      a.target = '_blank';
      c.append(a);
    });
    div.append(c);
  }
  document.getElementById('messages').append(div);
  div.scrollIntoView();
}

async function refreshQuota() {
  try {
    const s = await (await fetch('/api/stats')).json();
    document.getElementById('quota').textContent =
      `Quota: ${s.minute_used}/${s.minute_limit} per minute, ${s.daily_used}/${s.daily_limit} per day`;
  } catch (e) { /* stats are cosmetic */ }
}

document.getElementById('chat').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const input = document.getElementById('prompt');
  const message = input.value.trim();
  if (!message) return;
  input.value = '';
  addMsg('user', message);

  const resp = await fetch('/api/chat', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ message, history }),
  });
  const body = await resp.json();

  if (!resp.ok) {
    addMsg('warn', body.error ? body.error.message : 'Request failed.');
  } else {
    addMsg('assistant', body.reply, body.citations);
    history.push({ role: 'user', content: message });
    history.push({ role: 'assistant', content: body.reply });
  }
  refreshQuota();
});

refreshQuota();
</script>
</body>
</html>
"#;
