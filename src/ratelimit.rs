//! Request and token budget tracking for the Gemini API.
//!
//! Keeps rolling timestamp windows (per-minute, per-day, and a five-minute
//! window that drives adaptive cooldown backoff) plus a per-minute token
//! estimate, and rejects a call before it is made when any budget is
//! exhausted. State persists as JSON so quota survives restarts; a corrupt
//! or missing state file resets cleanly.
//!
//! All checks take an explicit `now` (epoch seconds) so the arithmetic is
//! testable without sleeping.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

use crate::config::LimitsConfig;

const MINUTE_WINDOW: f64 = 60.0;
const DAY_WINDOW: f64 = 86_400.0;
const BACKOFF_WINDOW: f64 = 300.0;
const MAX_BACKOFF: f64 = 60.0;

/// Why a request was refused. The rendered message is shown verbatim in the
/// chat UI and CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitExceeded {
    MinuteLimit { wait_secs: f64 },
    DailyLimit,
    TokenBudget { wait_secs: f64 },
    Cooldown { wait_secs: f64 },
}

impl std::fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitExceeded::MinuteLimit { wait_secs } => {
                write!(f, "Minute limit exceeded. Wait {:.0}s.", wait_secs)
            }
            RateLimitExceeded::DailyLimit => {
                write!(f, "Daily limit reached. Try again after the window resets.")
            }
            RateLimitExceeded::TokenBudget { wait_secs } => {
                write!(f, "Token budget exhausted. Wait {:.0}s.", wait_secs)
            }
            RateLimitExceeded::Cooldown { wait_secs } => {
                write!(f, "Please wait {:.1}s before the next request.", wait_secs)
            }
        }
    }
}

impl std::error::Error for RateLimitExceeded {}

/// Persisted rolling windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LimiterState {
    minute_requests: VecDeque<f64>,
    daily_requests: VecDeque<f64>,
    /// Five-minute window feeding the adaptive backoff.
    recent_requests: VecDeque<f64>,
    /// (timestamp, estimated tokens) pairs within the last minute.
    minute_tokens: VecDeque<(f64, u64)>,
    last_request_time: f64,
}

/// Quota snapshot for `askrepo stats` and `GET /api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStats {
    pub minute_used: usize,
    pub minute_limit: usize,
    pub minute_remaining: usize,
    pub daily_used: usize,
    pub daily_limit: usize,
    pub daily_remaining: usize,
    pub tokens_used_last_minute: u64,
    pub tokens_per_minute: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    limits: LimitsConfig,
    state_path: PathBuf,
    state: LimiterState,
}

impl RateLimiter {
    /// Load persisted state from `state_path`, resetting on any read or
    /// parse failure.
    pub fn load(limits: LimitsConfig, state_path: PathBuf) -> Self {
        let state = std::fs::read_to_string(&state_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Self {
            limits,
            state_path,
            state,
        }
    }

    /// Drop window entries that have aged out as of `now`.
    fn prune(&mut self, now: f64) {
        let s = &mut self.state;
        while s.minute_requests.front().is_some_and(|&t| t <= now - MINUTE_WINDOW) {
            s.minute_requests.pop_front();
        }
        while s.daily_requests.front().is_some_and(|&t| t <= now - DAY_WINDOW) {
            s.daily_requests.pop_front();
        }
        while s.recent_requests.front().is_some_and(|&t| t <= now - BACKOFF_WINDOW) {
            s.recent_requests.pop_front();
        }
        while s.minute_tokens.front().is_some_and(|&(t, _)| t <= now - MINUTE_WINDOW) {
            s.minute_tokens.pop_front();
        }
    }

    /// Adaptive backoff on top of the fixed cooldown: once three or more
    /// requests landed within the last minute, each further request doubles
    /// the wait, capped at sixty seconds.
    fn backoff_secs(&self, now: f64) -> f64 {
        let recent_minute = self
            .state
            .recent_requests
            .iter()
            .filter(|&&t| t > now - MINUTE_WINDOW)
            .count();
        if recent_minute >= 3 {
            let exp = (recent_minute as u32).saturating_sub(2).min(6);
            (2f64.powi(exp as i32)).min(MAX_BACKOFF)
        } else {
            0.0
        }
    }

    /// Would a request at `now` be allowed? Does not record anything.
    pub fn check(&mut self, now: f64) -> Result<(), RateLimitExceeded> {
        self.prune(now);
        let s = &self.state;

        if s.minute_requests.len() >= self.limits.requests_per_minute {
            // Oldest entry is at the front after pruning
            let oldest = s.minute_requests.front().copied().unwrap_or(now);
            return Err(RateLimitExceeded::MinuteLimit {
                wait_secs: (MINUTE_WINDOW - (now - oldest)).max(0.0),
            });
        }

        if s.daily_requests.len() >= self.limits.requests_per_day {
            return Err(RateLimitExceeded::DailyLimit);
        }

        let tokens_used: u64 = s.minute_tokens.iter().map(|&(_, n)| n).sum();
        if tokens_used >= self.limits.tokens_per_minute {
            let oldest = s.minute_tokens.front().map(|&(t, _)| t).unwrap_or(now);
            return Err(RateLimitExceeded::TokenBudget {
                wait_secs: (MINUTE_WINDOW - (now - oldest)).max(0.0),
            });
        }

        if s.last_request_time > 0.0 {
            let elapsed = now - s.last_request_time;
            let cooldown = self.limits.cooldown_secs + self.backoff_secs(now);
            if elapsed < cooldown {
                return Err(RateLimitExceeded::Cooldown {
                    wait_secs: cooldown - elapsed,
                });
            }
        }

        Ok(())
    }

    /// Record a request made at `now` that consumed an estimated
    /// `tokens` and persist the new state. Persistence failures are
    /// non-fatal; quota still applies in memory.
    pub fn record(&mut self, now: f64, tokens: u64) {
        let s = &mut self.state;
        s.minute_requests.push_back(now);
        s.daily_requests.push_back(now);
        s.recent_requests.push_back(now);
        s.minute_tokens.push_back((now, tokens));
        s.last_request_time = now;

        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to persist rate limit state");
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.state)?;
        std::fs::write(&self.state_path, json)
            .with_context(|| format!("writing {}", self.state_path.display()))?;
        Ok(())
    }

    pub fn stats(&mut self, now: f64) -> QuotaStats {
        self.prune(now);
        let s = &self.state;
        let tokens_used: u64 = s.minute_tokens.iter().map(|&(_, n)| n).sum();

        QuotaStats {
            minute_used: s.minute_requests.len(),
            minute_limit: self.limits.requests_per_minute,
            minute_remaining: self
                .limits
                .requests_per_minute
                .saturating_sub(s.minute_requests.len()),
            daily_used: s.daily_requests.len(),
            daily_limit: self.limits.requests_per_day,
            daily_remaining: self
                .limits
                .requests_per_day
                .saturating_sub(s.daily_requests.len()),
            tokens_used_last_minute: tokens_used,
            tokens_per_minute: self.limits.tokens_per_minute,
        }
    }
}

/// Rough token estimate at four characters per token, used for the TPM
/// budget. Counts chars, not bytes, so multi-byte text is not over-charged.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsConfig {
        LimitsConfig {
            requests_per_minute: 3,
            requests_per_day: 5,
            tokens_per_minute: 1000,
            cooldown_secs: 0.0,
            state_path: None,
        }
    }

    fn limiter(limits: LimitsConfig) -> (RateLimiter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let rl = RateLimiter::load(limits, dir.path().join("state.json"));
        (rl, dir)
    }

    #[test]
    fn nth_request_in_window_rejected() {
        let (mut rl, _dir) = limiter(limits());
        let t0 = 1_000.0;
        for i in 0..3 {
            let now = t0 + i as f64;
            assert!(rl.check(now).is_ok(), "request {} should pass", i);
            rl.record(now, 10);
        }
        match rl.check(t0 + 3.0) {
            Err(RateLimitExceeded::MinuteLimit { wait_secs }) => {
                // Oldest at t0; window frees at t0 + 60
                assert!((wait_secs - 57.0).abs() < 1e-6);
            }
            other => panic!("expected minute limit, got {:?}", other),
        }
    }

    #[test]
    fn window_slide_readmits_requests() {
        let (mut rl, _dir) = limiter(limits());
        let t0 = 1_000.0;
        for i in 0..3 {
            rl.record(t0 + i as f64, 10);
        }
        assert!(rl.check(t0 + 10.0).is_err());
        // 61s after the oldest request, one slot is free again
        assert!(rl.check(t0 + 61.0).is_ok());
    }

    #[test]
    fn daily_limit_is_independent_of_minute_window() {
        let (mut rl, _dir) = limiter(limits());
        // Five requests spread over hours: minute window is empty each time
        for i in 0..5 {
            let now = 1_000.0 + i as f64 * 3_600.0;
            assert!(rl.check(now).is_ok());
            rl.record(now, 10);
        }
        assert_eq!(
            rl.check(1_000.0 + 5.0 * 3_600.0),
            Err(RateLimitExceeded::DailyLimit)
        );
    }

    #[test]
    fn token_budget_enforced() {
        let mut l = limits();
        l.requests_per_minute = 100;
        let (mut rl, _dir) = limiter(l);
        rl.record(1_000.0, 999);
        assert!(rl.check(1_001.0).is_ok());
        rl.record(1_001.0, 1);
        match rl.check(1_002.0) {
            Err(RateLimitExceeded::TokenBudget { .. }) => {}
            other => panic!("expected token budget, got {:?}", other),
        }
        // Budget frees once the first entry ages out
        assert!(rl.check(1_000.0 + 61.0).is_ok());
    }

    #[test]
    fn cooldown_applies_between_requests() {
        let mut l = limits();
        l.cooldown_secs = 6.0;
        let (mut rl, _dir) = limiter(l);
        rl.record(1_000.0, 10);
        match rl.check(1_002.0) {
            Err(RateLimitExceeded::Cooldown { wait_secs }) => {
                assert!((wait_secs - 4.0).abs() < 1e-6);
            }
            other => panic!("expected cooldown, got {:?}", other),
        }
        assert!(rl.check(1_006.5).is_ok());
    }

    #[test]
    fn backoff_kicks_in_after_burst() {
        let mut l = limits();
        l.requests_per_minute = 100;
        l.cooldown_secs = 1.0;
        let (mut rl, _dir) = limiter(l);
        // Three rapid requests activate backoff: 2^(3-2) = 2s on top of cooldown
        for i in 0..3 {
            rl.record(1_000.0 + i as f64 * 5.0, 10);
        }
        match rl.check(1_012.0) {
            Err(RateLimitExceeded::Cooldown { wait_secs }) => {
                // last request at 1010, cooldown 1 + backoff 2 => free at 1013
                assert!((wait_secs - 1.0).abs() < 1e-6);
            }
            other => panic!("expected backoff cooldown, got {:?}", other),
        }
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut rl = RateLimiter::load(limits(), path.clone());
        for i in 0..3 {
            rl.record(1_000.0 + i as f64, 10);
        }

        let mut rl2 = RateLimiter::load(limits(), path);
        assert!(matches!(
            rl2.check(1_005.0),
            Err(RateLimitExceeded::MinuteLimit { .. })
        ));
    }

    #[test]
    fn corrupt_state_resets_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let mut rl = RateLimiter::load(limits(), path);
        assert!(rl.check(1_000.0).is_ok());
    }

    #[test]
    fn stats_report_usage() {
        let (mut rl, _dir) = limiter(limits());
        rl.record(1_000.0, 40);
        rl.record(1_001.0, 60);
        let stats = rl.stats(1_002.0);
        assert_eq!(stats.minute_used, 2);
        assert_eq!(stats.minute_remaining, 1);
        assert_eq!(stats.daily_used, 2);
        assert_eq!(stats.tokens_used_last_minute, 100);
    }

    #[test]
    fn token_estimate_rounds_up_in_chars() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // 5 chars regardless of byte length
        assert_eq!(estimate_tokens("grüße"), 2);
    }
}
