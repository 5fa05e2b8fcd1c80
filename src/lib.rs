//! # Lorekeeper
//!
//! A retrieval-augmented question answering pipeline over organizational
//! knowledge sources (wiki pages, chat transcripts, issue trackers, code
//! repositories).
//!
//! Lorekeeper consumes documents already normalized to a common shape by
//! external connectors, chunks and embeds them into a vector index, and
//! answers natural-language questions by retrieving the most similar
//! chunks and asking a hosted language model to synthesize a cited
//! answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Normalized   │──▶│   Ingest      │──▶│ Vector Index   │
//! │ documents    │   │ Chunk+Embed  │   │ + Catalog      │
//! └──────────────┘   └──────────────┘   └──────┬────────┘
//!                                              │
//!                        ┌─────────────────────┤
//!                        ▼                     ▼
//!                   ┌──────────┐        ┌───────────┐
//!                   │   CLI    │        │   HTTP    │
//!                   │  (lore)  │        │ query API │
//!                   └──────────┘        └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`chunk`] | Recursive separator-priority text chunking |
//! | [`embedding`] | Embedding service abstraction |
//! | [`index`] | Vector index (SQLite and in-memory backends) |
//! | [`catalog`] | Document-to-chunk metadata catalog |
//! | [`retrieve`] | Similarity retrieval |
//! | [`answer`] | Grounded answer synthesis |
//! | [`pipeline`] | Ingest and query orchestrators |
//! | [`server`] | HTTP query API |
//! | [`stats`] | Source statistics |
//! | [`db`] | Database connection |

pub mod answer;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod server;
pub mod stats;
