//! One-shot question answering for the CLI.

use anyhow::Result;

use crate::agent;
use crate::config::Config;
use crate::db;
use crate::logs;
use crate::ratelimit::{RateLimiter, RateLimitExceeded};

/// Answer a single question and print the result. Rate-limit refusals are
/// shown as a cooldown notice, not an error.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let mut limiter = RateLimiter::load(config.limits.clone(), config.limits_state_path());

    let reply = match agent::answer(config, &pool, &mut limiter, &[], question).await {
        Ok(reply) => reply,
        Err(e) => {
            if let Some(limit) = e.downcast_ref::<RateLimitExceeded>() {
                println!("{}", limit);
                pool.close().await;
                return Ok(());
            }
            pool.close().await;
            return Err(e);
        }
    };

    logs::log_interaction_best_effort(config, question, &reply);

    println!("{}", reply.text);

    if !reply.citations.is_empty() {
        println!();
        println!("Sources:");
        for cite in &reply.citations {
            match &cite.url {
                Some(url) => println!("  [{}]({})", cite.path, url),
                None => println!("  {}", cite.path),
            }
        }
    }

    pool.close().await;
    Ok(())
}
