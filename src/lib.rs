//! # askrepo
//!
//! A retrieval-augmented documentation assistant for GitHub repositories.
//!
//! askrepo ingests the markdown documentation of a GitHub repository,
//! chunks and indexes it in SQLite FTS5, and answers questions about it
//! through a Gemini-backed agent with quota-aware rate limiting, via a CLI
//! and an embedded web chat UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ GitHub zip   │──▶│   Pipeline   │──▶│  SQLite  │
//! │ archive      │   │ Chunk+Index  │   │   FTS5   │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │ retrieve
//!                       ┌────────────────────┤
//!                       ▼                    ▼
//!                  ┌──────────┐   ┌───────────────────┐
//!                  │   CLI    │   │  Agent + Limiter  │──▶ Gemini
//!                  │ (askrepo)│   │  (ask / serve)    │
//!                  └──────────┘   └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askrepo init                    # create database
//! askrepo sync                    # ingest the configured repository
//! askrepo search "planning"      # keyword search over the index
//! askrepo ask "what is an agent?" # one-shot RAG answer
//! askrepo serve                   # start the web chat UI
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`github`] | GitHub archive source (zip + frontmatter) |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`ingest`] | Sync pipeline orchestration |
//! | [`search`] | FTS5 keyword retrieval |
//! | [`agent`] | RAG answer assembly |
//! | [`gemini`] | Gemini API client |
//! | [`ratelimit`] | Request/token budget tracking |
//! | [`logs`] | JSON interaction logs |
//! | [`server`] | Chat HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod ask;
pub mod chunk;
pub mod config;
pub mod db;
pub mod gemini;
pub mod get;
pub mod github;
pub mod ingest;
pub mod logs;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod search;
pub mod server;
pub mod stats;
