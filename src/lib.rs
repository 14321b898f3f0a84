//! # Engram (library root)
//!
//! Engram is a **long-term memory engine for conversational agents**. It turns
//! multi-turn dialogue summaries into a durable, searchable substrate and
//! answers natural-language queries by fusing three signals:
//!
//! - semantic similarity over extracted *facts*,
//! - semantic similarity over stored *summaries*,
//! - graph-structural proximity via **Personalized PageRank** over a
//!   heterogeneous graph of entities and passages.
//!
//! The crate is organized around three subsystems plus their orchestration:
//! - Durable storage: [`document_store`], [`vector_index`], [`vector_db`].
//! - The entity/passage graph with PPR ranking: [`graph_store`].
//! - LLM-facing plumbing: [`llm`], [`embedding`], [`prompts`], [`extraction`],
//!   [`summarizer`].
//! - Orchestration: [`coordinator`] (ingest + retrieve pipelines) and
//!   [`engine`] (store wiring, per-user ingest queues, the host-facing API).
//!
//! ## Data directory layout
//!
//! One [`engine::MemoryEngine`] owns one data directory:
//!
//! ```text
//! <data_dir>/mem_fact.db      # document store, facts partition
//! <data_dir>/mem_fact.faiss   # vector index, facts partition
//! <data_dir>/mem_sum.db       # document store, summaries partition
//! <data_dir>/mem_sum.faiss    # vector index, summaries partition
//! <data_dir>/mem_graph/       # graph snapshot
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use engram::engine::MemoryEngine;
//!
//! # async fn demo() -> Result<(), engram::error::MemoryError> {
//! let config = engram::config::load_config("engram.yaml")?;
//! let engine = MemoryEngine::connect(config).await?;
//!
//! engine.add("Alice works at Acme.", "u1", None, None).await?;
//! let hits = engine.search("Where does Alice work?", "u1", None, 5).await?;
//! for hit in hits {
//!     println!("{} ({:.3}): {}", hit.passage_id, hit.score, hit.text);
//! }
//! # Ok(())
//! # }
//! ```

use once_cell::sync::OnceCell;

pub mod config;
pub mod coordinator;
pub mod document_store;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod graph_store;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod schema;
pub mod summarizer;
pub mod vector_db;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod test_support;

// Ensures the tracing subscriber is only installed once per process.
static TRACING: OnceCell<()> = OnceCell::new();

/// Initialize global tracing with the default formatter.
///
/// Safe to call repeatedly; only the first call installs the subscriber.
/// Hosts that bring their own subscriber can skip this entirely.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
}
