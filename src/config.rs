//! # Configuration Management
//!
//! Runtime settings for the memory engine, loaded from a YAML file with
//! [`load_config`]. The configuration covers four concerns:
//!
//! - **Chat endpoint**: OpenAI-compatible base URL, key, and model used for
//!   extraction, conflict checking, rewriting, and summarization.
//! - **Embedding endpoint**: OpenAI-compatible `/embeddings` URL, key, model,
//!   and the fixed vector dimension both indices are built with.
//! - **Data directory**: where the document stores, vector indices, and the
//!   graph snapshot live (see the crate root docs for the layout).
//! - **Pipeline tuning**: PPR damping factor, per-user ingest queue bound,
//!   and the dialogue-turn threshold at which buffered chat is summarized.
//!
//! ## YAML format
//!
//! ```yaml
//! api_key: "sk-...or-empty-for-local-backend..."
//! api_base: "http://localhost:5001/v1"
//! model: "qwen2.5-7b-instruct"
//!
//! embedding_api_key: ""
//! embedding_api_base: "http://localhost:5001/v1"
//! embedding_model: "nomic-embed-text-v1.5"
//! embedding_dimension: 768
//!
//! data_dir: "./engram_data"
//!
//! # Optional tuning
//! temperature: 0.2
//! max_tokens: 1024
//! ppr_alpha: 0.5
//! ingest_queue_bound: 32
//! summarize_threshold: 5
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use tracing::*;

use crate::error::MemoryError;

/// In-memory engine configuration loaded from `engram.yaml`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct EngramConfig {
    /// API key for the chat endpoint. Empty for unsecured local backends.
    pub api_key: String,

    /// Base URL of the OpenAI-compatible chat API, including `/v1`.
    pub api_base: String,

    /// Model identifier passed to `/v1/chat/completions`.
    pub model: String,

    /// API key for the embedding endpoint.
    #[serde(default)]
    pub embedding_api_key: String,

    /// Base URL of the OpenAI-compatible embedding API, including `/v1`.
    pub embedding_api_base: String,

    /// Model identifier passed to `/v1/embeddings`.
    pub embedding_model: String,

    /// Dimensionality of the embedding vectors. Both vector indices are
    /// created with this dimension and reject vectors of any other length.
    pub embedding_dimension: usize,

    /// Directory holding all persisted state. Created on first open.
    pub data_dir: String,

    /// Sampling temperature for structured LLM calls. `None` uses the
    /// backend default.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Completion cap for structured LLM calls.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// PageRank damping factor; the teleport probability is `1 - ppr_alpha`.
    #[serde(default = "default_ppr_alpha")]
    pub ppr_alpha: f64,

    /// Capacity of each per-user ingest queue. Producers that exceed it get
    /// a fail-fast error instead of unbounded buffering.
    #[serde(default = "default_ingest_queue_bound")]
    pub ingest_queue_bound: usize,

    /// Number of buffered dialogue turns that triggers summarization in
    /// [`crate::engine::MemoryEngine::observe_turn`].
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,
}

fn default_ppr_alpha() -> f64 {
    0.5
}

fn default_ingest_queue_bound() -> usize {
    32
}

fn default_summarize_threshold() -> usize {
    5
}

/// Load configuration from a YAML file and normalize settings.
///
/// An empty `data_dir` is replaced with `./engram_data` so a fresh config
/// never scatters state into the working directory root.
///
/// # Errors
/// I/O errors reading the file and YAML parse errors both surface here.
pub fn load_config(file: &str) -> Result<EngramConfig, MemoryError> {
    let content = fs::read_to_string(file)?;
    let mut config: EngramConfig = serde_yaml::from_str(&content)?;

    if config.data_dir.trim().is_empty() {
        warn!("data_dir is empty, using ./engram_data");
        config.data_dir = "./engram_data".to_string();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Verifies that a well-formed YAML file loads into `EngramConfig`.
    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: "example_api_key"
api_base: "http://example.com/v1"
model: "example_model"
embedding_api_base: "http://example.com/v1"
embedding_model: "example_embedder"
embedding_dimension: 768
data_dir: "mem_data"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path().to_str().unwrap());

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.api_key, "example_api_key");
        assert_eq!(config.model, "example_model");
        assert_eq!(config.embedding_dimension, 768);
        assert_eq!(config.data_dir, "mem_data");
        // Defaults kick in for the tuning block.
        assert_eq!(config.ppr_alpha, 0.5);
        assert_eq!(config.ingest_queue_bound, 32);
        assert_eq!(config.summarize_threshold, 5);
    }

    /// An empty data_dir is normalized to the default location.
    #[test]
    fn test_load_config_empty_data_dir() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: ""
api_base: "http://example.com/v1"
model: "m"
embedding_api_base: "http://example.com/v1"
embedding_model: "e"
embedding_dimension: 8
data_dir: "  "
"#
        )
        .unwrap();

        let config = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.data_dir, "./engram_data");
    }

    /// Non-existent file should surface an error.
    #[test]
    fn test_load_config_invalid_file() {
        let config = load_config("non/existent/path");
        assert!(config.is_err());
    }

    /// Malformed YAML should fail to parse.
    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap());
        assert!(config.is_err());
    }
}
