use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub github: GithubConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    /// Window advance in characters. Overlap is `size - step`.
    #[serde(default = "default_chunk_step")]
    pub step: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            step: default_chunk_step(),
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_chunk_step() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    /// Number of retrieved chunks stuffed into the LLM prompt.
    #[serde(default = "default_context_chunks")]
    pub context_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            final_limit: default_final_limit(),
            context_chunks: default_context_chunks(),
        }
    }
}

fn default_candidate_k() -> i64 {
    80
}
fn default_final_limit() -> i64 {
    12
}
fn default_context_chunks() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(rename = "rpm", default = "default_rpm")]
    pub requests_per_minute: usize,
    #[serde(rename = "rpd", default = "default_rpd")]
    pub requests_per_day: usize,
    #[serde(rename = "tpm", default = "default_tpm")]
    pub tokens_per_minute: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: f64,
    /// Where the limiter persists its timestamp windows. Defaults to a
    /// sibling of the database file when unset.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            requests_per_day: default_rpd(),
            tokens_per_minute: default_tpm(),
            cooldown_secs: default_cooldown(),
            state_path: None,
        }
    }
}

fn default_rpm() -> usize {
    10
}
fn default_rpd() -> usize {
    1500
}
fn default_tpm() -> u64 {
    1_000_000
}
fn default_cooldown() -> f64 {
    6.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("./logs")
}

impl Config {
    /// Resolved rate-limit state path: configured value or `<db dir>/rate_limit_state.json`.
    pub fn limits_state_path(&self) -> PathBuf {
        match &self.limits.state_path {
            Some(p) => p.clone(),
            None => {
                let parent = self.db.path.parent().unwrap_or_else(|| Path::new("."));
                parent.join("rate_limit_state.json")
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.size == 0 || config.chunking.step == 0 {
        anyhow::bail!("chunking.size and chunking.step must be > 0");
    }
    if config.chunking.step > config.chunking.size {
        anyhow::bail!("chunking.step must be <= chunking.size (windows must overlap or abut)");
    }

    // Validate retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.context_chunks == 0 {
        anyhow::bail!("retrieval.context_chunks must be >= 1");
    }

    // Validate github
    if config.github.owner.is_empty() || config.github.repo.is_empty() {
        anyhow::bail!("github.owner and github.repo must be set");
    }

    // Validate limits
    if config.limits.requests_per_minute == 0 || config.limits.requests_per_day == 0 {
        anyhow::bail!("limits.requests_per_minute and limits.requests_per_day must be > 0");
    }
    if config.limits.cooldown_secs < 0.0 {
        anyhow::bail!("limits.cooldown_secs must be >= 0");
    }

    Ok(config)
}
