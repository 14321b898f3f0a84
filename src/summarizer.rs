//! # Summarizer
//!
//! One LLM call that turns raw dialogue into a summary string. The fixed
//! system prompt asks for one or two sentences per actor/action with names
//! preserved verbatim, and permits two sentinel answers:
//!
//! - [`SENTINEL_NONE`]: nothing worth remembering; the caller skips ingest.
//! - [`SENTINEL_HOLD`]: the dialogue is unfinished; the caller defers and
//!   retries with more context.
//!
//! The summarizer itself returns the **raw** string; sentinel interpretation
//! belongs to the caller (see [`SummaryOutcome::interpret`]).

use std::sync::Arc;

use crate::error::MemoryError;
use crate::llm::LlmProvider;
use crate::prompts::SUMMARIZE_PROMPT;

/// Sentinel: the dialogue contained nothing worth remembering.
pub const SENTINEL_NONE: &str = "%None%";

/// Sentinel: defer summarization until more context arrives.
pub const SENTINEL_HOLD: &str = "%Hold%";

/// Interpretation of a raw summarizer answer.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    /// `%None%`: skip this dialogue entirely.
    Skip,
    /// `%Hold%`: keep the dialogue buffered and retry later.
    Hold,
    /// A usable summary.
    Text(String),
}

impl SummaryOutcome {
    /// Classify raw summarizer output. Sentinels match as case-sensitive
    /// substrings of the trimmed text.
    pub fn interpret(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains(SENTINEL_NONE) {
            return SummaryOutcome::Skip;
        }
        if trimmed.contains(SENTINEL_HOLD) {
            return SummaryOutcome::Hold;
        }
        SummaryOutcome::Text(trimmed.to_string())
    }
}

/// Wraps a single LLM call with the fixed summarize prompt.
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Summarize pre-assembled dialogue text. Returns the raw model output.
    pub async fn summarize(&self, dialogue: &str) -> Result<String, MemoryError> {
        self.provider.chat(SUMMARIZE_PROMPT, dialogue).await
    }

    /// Join `(role, content)` turns into the `role: content` transcript shape
    /// the prompt expects.
    pub fn assemble_context(turns: &[(String, String)]) -> String {
        turns
            .iter()
            .map(|(role, content)| format!("{role}: {content}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
