//! # Structured extraction calls
//!
//! The typed surface over the raw chat contract: entity extraction, relation
//! extraction, conflict detection, and summary rewriting. Every call here
//! follows the same robustness rule: the model's output is free-form text
//! expected to contain JSON, and anything that fails to parse degrades to an
//! **empty result** rather than an error, so a flaky model can never wedge an
//! ingest. The coordinator treats empty results as "nothing extracted".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{LlmProvider, extract_json};
use crate::prompts;

/// A named entity extracted from a summary.
///
/// `name` may contain the literal token `USER_ID`, which the coordinator
/// replaces with the ingesting user's id before any graph lookup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A directed relation between two extracted entities.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Relation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    /// Declarative sentence witnessing the relation; used as the stored fact
    /// text when present.
    #[serde(default)]
    pub fact: Option<String>,
}

/// One verdict from the conflict check, keyed by new-fact index.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConflictVerdict {
    /// 0 = unrelated, 1 = conflict, 2 = duplicate.
    pub result: i64,
    /// Index into the existing-facts list; -1 when unrelated.
    #[serde(default = "default_existing_idx")]
    pub existing_fact_idx: i64,
    #[serde(default)]
    pub reason: String,
}

fn default_existing_idx() -> i64 {
    -1
}

/// Structured adapter over any [`LlmProvider`].
#[derive(Clone)]
pub struct MemoryLlm {
    provider: Arc<dyn LlmProvider>,
}

impl MemoryLlm {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Extract entities from a summary. Empty on any failure.
    pub async fn extract_entities(&self, text: &str) -> Vec<Entity> {
        let response = match self
            .provider
            .chat(prompts::EXTRACT_ENTITIES_PROMPT, text)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "entity extraction call failed");
                return Vec::new();
            }
        };
        let Some(value) = extract_json(&response) else {
            warn!("entity extraction returned non-JSON output");
            return Vec::new();
        };
        let entities: Vec<Entity> = value
            .get("entities")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        debug!(count = entities.len(), "entities extracted");
        entities
    }

    /// Extract relations between known entities. Empty on any failure.
    pub async fn build_relations(&self, entities: &[Entity], text: &str) -> Vec<Relation> {
        let entities_json =
            serde_json::to_string_pretty(entities).unwrap_or_else(|_| "[]".to_string());
        let user_prompt = format!(
            "# Extracted entities:\n```\n{entities_json}\n```\n# Original text:\n`{text}`\n"
        );
        let response = match self
            .provider
            .chat(prompts::BUILD_RELATIONS_PROMPT, &user_prompt)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "relation extraction call failed");
                return Vec::new();
            }
        };
        let Some(value) = extract_json(&response) else {
            warn!("relation extraction returned non-JSON output");
            return Vec::new();
        };
        let relations: Vec<Relation> = value
            .get("relations")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        debug!(count = relations.len(), "relations extracted");
        relations
    }

    /// Compare numbered new facts against numbered existing facts.
    ///
    /// Returns a map from new-fact index to verdict. Non-numeric keys and
    /// malformed verdict objects are skipped; total parse failure yields an
    /// empty map (treated as "all unrelated").
    pub async fn check_conflict(
        &self,
        new_facts: &[String],
        existing_facts: &[String],
    ) -> HashMap<usize, ConflictVerdict> {
        let numbered = |facts: &[String]| {
            facts
                .iter()
                .enumerate()
                .map(|(idx, fact)| format!("{idx}: {fact}\n"))
                .collect::<String>()
        };
        let user_prompt = prompts::CONFLICT_CHECK_PROMPT
            .replace("{new_facts}", &numbered(new_facts))
            .replace("{existing_facts}", &numbered(existing_facts));

        let response = match self
            .provider
            .chat(prompts::CONFLICT_CHECK_SYSTEM, &user_prompt)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "conflict check call failed");
                return HashMap::new();
            }
        };
        let Some(value) = extract_json(&response) else {
            warn!("conflict check returned non-JSON output");
            return HashMap::new();
        };
        let Some(object) = value.as_object() else {
            return HashMap::new();
        };

        let mut verdicts = HashMap::new();
        for (key, raw) in object {
            let Ok(idx) = key.parse::<usize>() else {
                continue;
            };
            match serde_json::from_value::<ConflictVerdict>(raw.clone()) {
                Ok(verdict) => {
                    verdicts.insert(idx, verdict);
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "skipping malformed conflict verdict");
                }
            }
        }
        verdicts
    }

    /// Rewrite a summary around a resolved conflict. `None` on any failure.
    pub async fn rewrite_summary(
        &self,
        old_summary: &str,
        conflicting_fact: &str,
        new_fact: &str,
    ) -> Option<String> {
        let user_prompt = prompts::REWRITE_SUMMARY_PROMPT
            .replace("{old_summary}", old_summary)
            .replace("{conflicting_fact}", conflicting_fact)
            .replace("{new_fact}", new_fact);
        match self
            .provider
            .chat(prompts::REWRITE_SUMMARY_SYSTEM, &user_prompt)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!("summary rewrite returned empty output");
                None
            }
            Err(e) => {
                warn!(error = %e, "summary rewrite call failed");
                None
            }
        }
    }
}
