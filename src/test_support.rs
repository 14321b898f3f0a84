//! Deterministic in-process fakes for pipeline tests: a hashed bag-of-words
//! embedding and a scripted chat provider routed by system prompt. No
//! network, no randomness, so every test run ranks identically.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::MemoryError;
use crate::llm::LlmProvider;
use crate::prompts;
use crate::summarizer::SENTINEL_NONE;

/// Deterministic embedding: FNV-hashed bag of words, L2-normalized.
///
/// Identical texts embed identically (distance 0) and word overlap moves
/// vectors closer, which is all the retrieval tests rely on.
pub struct HashEmbedding {
    dim: usize,
}

impl HashEmbedding {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn fnv1a(word: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (Self::fnv1a(word) % self.dim as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Scripted chat provider. Each structured call category has its own FIFO
/// queue of canned responses; an empty queue falls back to a harmless
/// default ("nothing extracted").
#[derive(Default)]
pub struct ScriptedLlm {
    entities: Mutex<VecDeque<String>>,
    relations: Mutex<VecDeque<String>>,
    conflicts: Mutex<VecDeque<String>>,
    rewrites: Mutex<VecDeque<String>>,
    summaries: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_entities(&self, response: &str) {
        self.entities.lock().unwrap().push_back(response.to_string());
    }

    pub fn push_relations(&self, response: &str) {
        self.relations.lock().unwrap().push_back(response.to_string());
    }

    pub fn push_conflicts(&self, response: &str) {
        self.conflicts.lock().unwrap().push_back(response.to_string());
    }

    pub fn push_rewrites(&self, response: &str) {
        self.rewrites.lock().unwrap().push_back(response.to_string());
    }

    pub fn push_summaries(&self, response: &str) {
        self.summaries.lock().unwrap().push_back(response.to_string());
    }

    /// Ordered categories of every chat call made so far.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn pop(queue: &Mutex<VecDeque<String>>, default: &str) -> String {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| default.to_string())
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, system_prompt: &str, _user_prompt: &str) -> Result<String, MemoryError> {
        let (category, response) = if system_prompt == prompts::EXTRACT_ENTITIES_PROMPT {
            ("entities", Self::pop(&self.entities, r#"{"entities": []}"#))
        } else if system_prompt == prompts::BUILD_RELATIONS_PROMPT {
            ("relations", Self::pop(&self.relations, r#"{"relations": []}"#))
        } else if system_prompt == prompts::CONFLICT_CHECK_SYSTEM {
            ("conflicts", Self::pop(&self.conflicts, "{}"))
        } else if system_prompt == prompts::REWRITE_SUMMARY_SYSTEM {
            ("rewrites", Self::pop(&self.rewrites, "updated summary"))
        } else if system_prompt == prompts::SUMMARIZE_PROMPT {
            ("summaries", Self::pop(&self.summaries, SENTINEL_NONE))
        } else {
            ("unknown", "{}".to_string())
        };
        self.calls.lock().unwrap().push(category);
        Ok(response)
    }
}

/// Canned responses for a single-relation ingest of
/// "{source} {relation_type} {target}". Convenience for coordinator and
/// engine tests.
pub fn script_simple_ingest(llm: &ScriptedLlm, source: &str, target: &str, relation: &str, fact: &str) {
    llm.push_entities(&format!(
        r#"{{"entities": [{{"type": "person", "name": "{source}"}}, {{"type": "entity", "name": "{target}"}}]}}"#
    ));
    llm.push_relations(&format!(
        r#"{{"relations": [{{"source": "{source}", "target": "{target}", "relation_type": "{relation}", "fact": "{fact}"}}]}}"#
    ));
}
