//! # Memory Coordinator (ingest + retrieve pipelines)
//!
//! The coordinator is the only component allowed to write across the
//! store boundary: the vector DBs own text and vectors, the graph store owns
//! structure, and the procedures here keep the two in agreement.
//!
//! ## Ingest
//!
//! One accepted summary flows through eight steps:
//!
//! 1. Extract entities; none means the summary touches no store at all.
//! 2. Extract relations between those entities; none means the same.
//! 3. Check each new fact against the user's existing facts. Duplicates mark
//!    the incoming relation for dropping. Conflicts trigger the repair path:
//!    the old summary is rewritten in place, and the conflicting phase edge
//!    and fact record are deleted in the same logical step (preserving the
//!    fact/edge bijection).
//! 4. Drop marked relations and recompute the active entity set.
//! 5. Insert the summary record and its passage node.
//! 6. Resolve or create phase nodes by canonical name (the `USER_ID` token
//!    is replaced with the ingesting user first) and link each to the new
//!    passage.
//! 7. Add one phase edge plus one fact record per surviving relation.
//! 8. Persist the graph.
//!
//! ## Retrieve
//!
//! Vector hits over facts seed the endpoint entities (mean similarity per
//! node); vector hits over summaries seed their passage nodes, damped by the
//! [`PASSAGE_NODE_RESET_FACTOR`]. The union feeds Personalized PageRank over
//! the user's subgraph, and the top-ranked passage nodes come back with
//! their summary texts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document_store::MetadataFilter;
use crate::error::MemoryError;
use crate::extraction::{Entity, MemoryLlm, Relation};
use crate::graph_store::{
    GraphExport, GraphStore, PASSAGE_RELATION_TYPE, PassageEdge, PassageNode, PhaseEdge,
    PhaseNode, PropertyFilter,
};
use crate::models::{FactMetadata, SummaryMetadata};
use crate::vector_db::VectorDb;

/// Reset-probability scale for passage-node seeds in the PPR
/// personalization, balancing fact-seeded and summary-seeded signals.
pub const PASSAGE_NODE_RESET_FACTOR: f64 = 0.05;

/// Nearest facts consulted per retrieval.
const FACT_SEARCH_K: usize = 5;
/// Nearest summaries consulted per retrieval.
const SUMMARY_SEARCH_K: usize = 3;
/// Nearest existing facts consulted per new relation during conflict check.
const CONFLICT_SEARCH_K: usize = 3;
/// Over-fetch size for metadata-filtered vector searches.
const FETCH_K: usize = 20;

const PPR_MAX_ITER: usize = 100;
const PPR_TOL: f64 = 1e-6;

/// One ranked passage returned by [`MemoryCoordinator::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub passage_id: String,
    pub text: String,
    pub score: f64,
}

/// Orchestrates the vector DBs, the graph store, and the LLM adapter.
pub struct MemoryCoordinator {
    llm: MemoryLlm,
    fact_db: Arc<Mutex<VectorDb>>,
    summary_db: Arc<Mutex<VectorDb>>,
    graph: Arc<Mutex<GraphStore>>,
    ppr_alpha: f64,
}

impl MemoryCoordinator {
    pub fn new(
        llm: MemoryLlm,
        fact_db: Arc<Mutex<VectorDb>>,
        summary_db: Arc<Mutex<VectorDb>>,
        graph: Arc<Mutex<GraphStore>>,
        ppr_alpha: f64,
    ) -> Self {
        Self {
            llm,
            fact_db,
            summary_db,
            graph,
            ppr_alpha,
        }
    }

    /// Ingest one summary for `user_id`.
    ///
    /// Soft failures (no entities, no relations, unparseable LLM output)
    /// terminate cleanly without touching any store. Storage failures
    /// propagate.
    pub async fn ingest(
        &self,
        text: &str,
        user_id: &str,
        group_id: Option<&str>,
        username: Option<&str>,
    ) -> Result<(), MemoryError> {
        let username = username.unwrap_or(user_id);

        let entities = self.llm.extract_entities(text).await;
        if entities.is_empty() {
            info!(user_id, "no entities extracted, skipping ingest");
            return Ok(());
        }

        let relations = self.llm.build_relations(&entities, text).await;
        if relations.is_empty() {
            info!(user_id, "no relations extracted, skipping ingest");
            return Ok(());
        }
        debug!(entities = entities.len(), relations = relations.len(), "extraction done");

        let ts = chrono::Utc::now().timestamp();

        // Duplicate/conflict pass. Conflicts are repaired as a side effect;
        // duplicates come back as indices to drop.
        let dropped = self.check_relations(&relations, user_id).await?;
        let surviving: Vec<Relation> = relations
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !dropped.contains(idx))
            .map(|(_, relation)| relation)
            .collect();

        let active_names: HashSet<&str> = surviving
            .iter()
            .flat_map(|r| [r.source.as_str(), r.target.as_str()])
            .collect();
        let entities: Vec<Entity> = entities
            .into_iter()
            .filter(|e| active_names.contains(e.name.as_str()))
            .collect();

        // The passage is recorded even when every relation was a duplicate;
        // only the fact/edge side is suppressed.
        let summary_id = Uuid::new_v4().to_string();
        info!(user_id, summary_id = %summary_id, "summary insert");
        let summary_metadata = serde_json::to_value(SummaryMetadata {
            user_id: user_id.to_string(),
            group_id: group_id.map(str::to_string),
        })?;
        self.summary_db
            .lock()
            .await
            .insert(text, &summary_metadata, Some(&summary_id))
            .await?;
        self.graph.lock().await.add_passage_node(PassageNode {
            id: summary_id.clone(),
            ts,
            user_id: user_id.to_string(),
        });

        // Phase nodes: reuse by canonical name, create otherwise. The map is
        // keyed by the extractor's raw name because relations reference it.
        let mut node_id: HashMap<String, String> = HashMap::new();
        {
            let mut graph = self.graph.lock().await;
            for entity in &entities {
                let real_name = entity.name.replace("USER_ID", user_id);
                let id = match graph.find_phase_node_by_name(&real_name) {
                    Some(existing) => {
                        debug!(name = %real_name, id = %existing, "phase node already exists");
                        existing
                    }
                    None => {
                        let fresh = Uuid::new_v4().to_string();
                        graph.add_phase_node(PhaseNode {
                            id: fresh.clone(),
                            ts,
                            name: real_name,
                            kind: entity.kind.clone(),
                        });
                        fresh
                    }
                };
                node_id.insert(entity.name.clone(), id.clone());
                graph.add_passage_edge(PassageEdge {
                    source: id,
                    target: summary_id.clone(),
                    ts,
                    relation_type: PASSAGE_RELATION_TYPE.to_string(),
                    summary_id: summary_id.clone(),
                    user_id: user_id.to_string(),
                });
            }
        }

        // One phase edge plus one fact record per surviving relation.
        for relation in &surviving {
            let (Some(source), Some(target)) =
                (node_id.get(&relation.source), node_id.get(&relation.target))
            else {
                debug!(
                    source = %relation.source,
                    target = %relation.target,
                    "relation references unknown entity, dropping"
                );
                continue;
            };
            let fact_id = Uuid::new_v4().to_string();
            self.graph.lock().await.add_phase_edge(PhaseEdge {
                source: source.clone(),
                target: target.clone(),
                ts,
                relation_type: relation.relation_type.clone(),
                fact_id: fact_id.clone(),
                user_id: user_id.to_string(),
            });

            let fact_text = relation
                .fact
                .clone()
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "{} {} {}",
                        relation.source, relation.relation_type, relation.target
                    )
                });
            let fact_metadata = serde_json::to_value(FactMetadata {
                user_id: user_id.to_string(),
                username: username.to_string(),
                summary_id: summary_id.clone(),
            })?;
            self.fact_db
                .lock()
                .await
                .insert(&fact_text, &fact_metadata, Some(&fact_id))
                .await?;
        }

        self.graph.lock().await.save()?;
        Ok(())
    }

    /// Duplicate/conflict detection over the incoming relations.
    ///
    /// Returns the indices of relations to drop (duplicates). Conflicts are
    /// resolved in place: summary rewrite, then edge and fact deletion in
    /// the same logical step.
    async fn check_relations(
        &self,
        relations: &[Relation],
        user_id: &str,
    ) -> Result<HashSet<usize>, MemoryError> {
        let mut dropped = HashSet::new();

        // Only relations carrying a fact sentence can be checked.
        let checkable: Vec<usize> = relations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.fact.as_deref().is_some_and(|f| !f.is_empty()))
            .map(|(idx, _)| idx)
            .collect();
        if checkable.is_empty() {
            return Ok(dropped);
        }

        let filter = MetadataFilter::new().with("user_id", user_id);
        let mut seen_doc_ids = HashSet::new();
        let mut existing = Vec::new();
        for &idx in &checkable {
            let fact = relations[idx].fact.as_deref().unwrap_or_default();
            let hits = self
                .fact_db
                .lock()
                .await
                .retrieve(fact, CONFLICT_SEARCH_K, FETCH_K, Some(&filter))
                .await?;
            for hit in hits {
                if seen_doc_ids.insert(hit.doc.doc_id.clone()) {
                    existing.push(hit);
                }
            }
        }
        if existing.is_empty() {
            return Ok(dropped);
        }

        let new_facts: Vec<String> = checkable
            .iter()
            .map(|&idx| relations[idx].fact.clone().unwrap_or_default())
            .collect();
        let existing_texts: Vec<String> = existing.iter().map(|h| h.doc.text.clone()).collect();
        let verdicts = self.llm.check_conflict(&new_facts, &existing_texts).await;

        let mut ordered: Vec<_> = verdicts.into_iter().collect();
        ordered.sort_by_key(|(idx, _)| *idx);

        for (check_idx, verdict) in ordered {
            if check_idx >= checkable.len() {
                continue;
            }
            let Ok(existing_idx) = usize::try_from(verdict.existing_fact_idx) else {
                continue;
            };
            if existing_idx >= existing.len() {
                continue;
            }
            let relation_idx = checkable[check_idx];

            match verdict.result {
                1 => {
                    let old = &existing[existing_idx];
                    info!(
                        reason = %verdict.reason,
                        old_fact = %old.doc.text,
                        new_fact = %new_facts[check_idx],
                        "conflict detected"
                    );
                    let metadata = match old.doc.fact_metadata() {
                        Ok(metadata) => metadata,
                        Err(e) => {
                            warn!(doc_id = %old.doc.doc_id, error = %e, "fact metadata unreadable, skipping conflict");
                            continue;
                        }
                    };

                    let old_summary = self
                        .summary_db
                        .lock()
                        .await
                        .documents()
                        .get_by_doc_id(&metadata.summary_id)?;
                    let Some(old_summary) = old_summary else {
                        warn!(summary_id = %metadata.summary_id, "conflicting fact has no summary, skipping");
                        continue;
                    };

                    let Some(rewritten) = self
                        .llm
                        .rewrite_summary(&old_summary.text, &old.doc.text, &new_facts[check_idx])
                        .await
                    else {
                        warn!(summary_id = %metadata.summary_id, "summary rewrite failed, leaving stores untouched");
                        continue;
                    };

                    self.summary_db
                        .lock()
                        .await
                        .documents()
                        .update_text_by_doc_id(&metadata.summary_id, &rewritten)?;
                    // Edge and fact leave together; the bijection holds.
                    self.graph
                        .lock()
                        .await
                        .delete_phase_edge_by_fact_id(&old.doc.doc_id);
                    self.fact_db.lock().await.delete(old.doc.id)?;
                }
                2 => {
                    info!(
                        reason = %verdict.reason,
                        duplicate = %new_facts[check_idx],
                        of = %existing[existing_idx].doc.text,
                        "duplicate detected"
                    );
                    dropped.insert(relation_idx);
                }
                _ => {}
            }
        }
        Ok(dropped)
    }

    /// Retrieve the most relevant passages for `query`.
    ///
    /// `filters` must include a `user_id` predicate; retrieval without one
    /// returns nothing rather than leaking across users.
    pub async fn retrieve(
        &self,
        query: &str,
        num_to_retrieve: usize,
        filters: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let Some(user_id) = filters
            .iter()
            .find(|(key, _)| key == "user_id")
            .map(|(_, value)| value.clone())
        else {
            warn!("retrieval without user_id filter refused");
            return Ok(Vec::new());
        };

        // Fact hits seed both endpoint entities of each witnessing edge.
        let fact_hits = self
            .fact_db
            .lock()
            .await
            .retrieve(query, FACT_SEARCH_K, FETCH_K, Some(filters))
            .await?;
        let mut contributions: HashMap<String, Vec<f64>> = HashMap::new();
        {
            let graph = self.graph.lock().await;
            for hit in &fact_hits {
                for (source, target) in graph.get_phase_nodes_by_fact_id(&hit.doc.doc_id) {
                    contributions
                        .entry(source.id)
                        .or_default()
                        .push(hit.similarity as f64);
                    contributions
                        .entry(target.id)
                        .or_default()
                        .push(hit.similarity as f64);
                }
            }
        }
        let phase_seeds: HashMap<String, f64> = contributions
            .into_iter()
            .map(|(node, scores)| {
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                (node, mean)
            })
            .collect();
        debug!(seeds = phase_seeds.len(), "entity seeds from fact hits");

        // Summary hits seed their own passage nodes, damped by the reset
        // factor; entity seeds win on collision.
        let summary_hits = self
            .summary_db
            .lock()
            .await
            .retrieve(query, SUMMARY_SEARCH_K, FETCH_K, Some(filters))
            .await?;
        let mut personalization: HashMap<String, f64> = summary_hits
            .iter()
            .map(|hit| {
                (
                    hit.doc.doc_id.clone(),
                    PASSAGE_NODE_RESET_FACTOR * hit.similarity as f64,
                )
            })
            .collect();
        for (node, score) in phase_seeds {
            personalization.insert(node, score);
        }

        let (ranked, passage_ids) = {
            let graph = self.graph.lock().await;
            let ranked =
                graph.run_ppr(&personalization, &user_id, self.ppr_alpha, PPR_MAX_ITER, PPR_TOL);
            let passage_ids: HashSet<String> = graph
                .get_passage_nodes(&PropertyFilter::new())
                .into_iter()
                .map(|n| n.id)
                .collect();
            (ranked, passage_ids)
        };

        let mut results = Vec::new();
        for (node_id, score) in ranked {
            if !passage_ids.contains(&node_id) {
                continue;
            }
            let doc = self
                .summary_db
                .lock()
                .await
                .documents()
                .get_by_doc_id(&node_id)?;
            let Some(doc) = doc else {
                debug!(passage_id = %node_id, "passage without summary record, skipping");
                continue;
            };
            results.push(SearchHit {
                passage_id: node_id,
                text: doc.text,
                score,
            });
            if results.len() >= num_to_retrieve {
                break;
            }
        }
        info!(query_len = query.len(), hits = results.len(), "retrieval done");
        Ok(results)
    }

    /// Graph snapshot for external inspection.
    pub async fn get_graph(&self, filter: &PropertyFilter) -> GraphExport {
        self.graph.lock().await.get_graph_export(filter)
    }

    /// Distinct user ids present in the facts partition.
    pub async fn get_user_ids(&self) -> Result<Vec<String>, MemoryError> {
        let users = self.fact_db.lock().await.documents().get_user_ids()?;
        Ok(users.into_iter().collect())
    }

    /// Remove fact records whose phase edge no longer exists.
    ///
    /// An ingest cancelled between the fact insert and the graph save can
    /// leave a fact without its edge; the bijection invariant makes such
    /// records unreachable, so they are swept at startup.
    pub async fn reconcile_startup(&self) -> Result<usize, MemoryError> {
        let live_fact_ids: HashSet<String> = {
            let graph = self.graph.lock().await;
            graph
                .get_phase_edges(&PropertyFilter::new())
                .into_iter()
                .map(|e| e.fact_id)
                .collect()
        };

        let mut swept = 0;
        let mut fact_db = self.fact_db.lock().await;
        let all_facts = fact_db
            .documents()
            .get_documents(&MetadataFilter::new(), None)?;
        for doc in all_facts {
            if !live_fact_ids.contains(&doc.doc_id) {
                warn!(doc_id = %doc.doc_id, "sweeping orphaned fact record");
                fact_db.delete(doc.id)?;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
