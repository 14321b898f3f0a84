//! # Error taxonomy
//!
//! One error type covers the whole engine, split along the propagation policy
//! the pipeline follows:
//!
//! - **Hard failures** (`Storage`, `Connection`, `Io`, `Snapshot`, `Index`)
//!   come from the durable stores and always propagate to the caller.
//! - **Soft failures** never reach this type at the pipeline boundary: a
//!   malformed LLM response is parsed into an empty structured result and the
//!   coordinator logs and continues. `Llm` / `Embedding` only appear after
//!   the bounded retry budget is exhausted.
//! - **Invalid input** (`Dimension`) drops the offending item; the caller
//!   decides whether to continue.
//! - `Backpressure` is the fail-fast answer to a full per-user ingest queue.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A Diesel query failed against the document store.
    #[error("document store error: {0}")]
    Storage(#[from] diesel::result::Error),

    /// The SQLite database could not be opened.
    #[error("database connection error: {0}")]
    Connection(#[from] diesel::result::ConnectionError),

    /// Filesystem error while persisting or loading an index or snapshot.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The graph snapshot on disk could not be encoded or decoded.
    #[error("graph snapshot error: {0}")]
    Snapshot(String),

    /// The ANN index rejected an operation.
    #[error("vector index error: {0}")]
    Index(String),

    /// Metadata or an LLM payload failed to (de)serialize.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The YAML configuration file was malformed.
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// A vector's length did not match the configured index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// The chat endpoint kept failing after the bounded retry budget.
    #[error("llm request failed: {0}")]
    Llm(String),

    /// The embedding endpoint kept failing after the bounded retry budget.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// The per-user ingest queue is full; the producer should slow down.
    #[error("ingest queue full for user `{user_id}`")]
    Backpressure { user_id: String },

    /// The ingest was cancelled before completion (engine shutdown).
    #[error("ingest cancelled for user `{user_id}`")]
    Cancelled { user_id: String },
}
