//! # Memory Engine (wiring, scheduling, and the host-facing API)
//!
//! One [`MemoryEngine`] owns one data directory and everything inside it:
//! both vector DB partitions, the graph store, the coordinator, and the LLM
//! plumbing. Hosts talk to the engine through four calls ([`add`],
//! [`search`], [`get_graph`], [`list_user_ids`]) plus the dialogue helper
//! [`observe_turn`].
//!
//! ## Scheduling model
//!
//! Ingestion is serialized **per user**: each `user_id` gets a FIFO queue
//! and one worker task, so at most one ingest per user runs at a time while
//! different users proceed in parallel. The queues are bounded; a producer
//! that outruns its queue receives [`MemoryError::Backpressure`] immediately
//! instead of buffering without limit. Retrievals are not queued; they run
//! against the last committed state.
//!
//! Shared stores sit behind async mutexes, which serializes writes (an
//! index update must precede its persistence) while keeping every store
//! access a suspension point.
//!
//! ## Startup reconciliation
//!
//! Opening the engine sweeps fact records whose phase edge never landed
//! (an ingest cancelled mid-flight), restoring the fact/edge bijection
//! before any new work is accepted.
//!
//! [`add`]: MemoryEngine::add
//! [`search`]: MemoryEngine::search
//! [`get_graph`]: MemoryEngine::get_graph
//! [`list_user_ids`]: MemoryEngine::list_user_ids
//! [`observe_turn`]: MemoryEngine::observe_turn

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::EngramConfig;
use crate::coordinator::{MemoryCoordinator, SearchHit};
use crate::document_store::{DocumentStore, MetadataFilter};
use crate::embedding::{EmbeddingProvider, OpenAiEmbeddings};
use crate::error::MemoryError;
use crate::extraction::MemoryLlm;
use crate::graph_store::{GraphExport, GraphStore, PropertyFilter};
use crate::llm::{LlmProvider, OpenAiChat};
use crate::summarizer::{Summarizer, SummaryOutcome};
use crate::vector_db::VectorDb;
use crate::vector_index::VectorIndex;

struct IngestJob {
    text: String,
    group_id: Option<String>,
    username: Option<String>,
    done: oneshot::Sender<Result<(), MemoryError>>,
}

#[derive(Default)]
struct DialogueBuffer {
    turns: Vec<(String, String)>,
    /// Turns accumulated since the last summarization attempt.
    pending: usize,
}

/// What happened to a dialogue turn handed to
/// [`MemoryEngine::observe_turn`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Below the threshold; the turn was buffered.
    Buffered,
    /// The summarizer answered `%None%`; the buffered dialogue was dropped.
    Skipped,
    /// The summarizer answered `%Hold%`; the buffer is kept for more context.
    Held,
    /// A summary was produced and ingested.
    Ingested,
}

/// The long-term memory engine.
pub struct MemoryEngine {
    coordinator: Arc<MemoryCoordinator>,
    summarizer: Summarizer,
    config: EngramConfig,
    workers: Mutex<HashMap<String, mpsc::Sender<IngestJob>>>,
    dialogues: Mutex<HashMap<String, DialogueBuffer>>,
}

impl MemoryEngine {
    /// Open the engine with explicit providers.
    ///
    /// Builds both vector DB partitions and the graph store under
    /// `config.data_dir`, then runs the startup reconciliation sweep.
    pub async fn open(
        config: EngramConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, MemoryError> {
        let data_dir = Path::new(&config.data_dir);
        std::fs::create_dir_all(data_dir)?;
        let dimension = config.embedding_dimension;

        let fact_db = VectorDb::new(
            DocumentStore::open(data_dir.join("mem_fact.db"))?,
            VectorIndex::open(dimension, data_dir.join("mem_fact.faiss"))?,
            embedder.clone(),
        );
        let summary_db = VectorDb::new(
            DocumentStore::open(data_dir.join("mem_sum.db"))?,
            VectorIndex::open(dimension, data_dir.join("mem_sum.faiss"))?,
            embedder.clone(),
        );
        let graph = GraphStore::open(data_dir.join("mem_graph"))?;

        let coordinator = Arc::new(MemoryCoordinator::new(
            MemoryLlm::new(llm.clone()),
            Arc::new(Mutex::new(fact_db)),
            Arc::new(Mutex::new(summary_db)),
            Arc::new(Mutex::new(graph)),
            config.ppr_alpha,
        ));

        let swept = coordinator.reconcile_startup().await?;
        if swept > 0 {
            info!(swept, "startup reconciliation removed orphaned facts");
        }

        Ok(Self {
            coordinator,
            summarizer: Summarizer::new(llm),
            config,
            workers: Mutex::new(HashMap::new()),
            dialogues: Mutex::new(HashMap::new()),
        })
    }

    /// Open the engine with the OpenAI-compatible providers described by
    /// `config`.
    pub async fn connect(config: EngramConfig) -> Result<Self, MemoryError> {
        let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiChat::new(
            &config.api_base,
            &config.api_key,
            &config.model,
            config.temperature,
            config.max_tokens,
        ));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbeddings::new(
            &config.embedding_api_base,
            &config.embedding_api_key,
            &config.embedding_model,
            config.embedding_dimension,
        ));
        Self::open(config, llm, embedder).await
    }

    /// Ingest one summary for `user_id`, serialized behind the user's FIFO
    /// queue.
    ///
    /// # Errors
    /// - [`MemoryError::Backpressure`] when the user's queue is full.
    /// - Storage failures from the ingest itself.
    pub async fn add(
        &self,
        text: &str,
        user_id: &str,
        group_id: Option<&str>,
        username: Option<&str>,
    ) -> Result<(), MemoryError> {
        let sender = self.worker_for(user_id).await;
        let (done_tx, done_rx) = oneshot::channel();
        let job = IngestJob {
            text: text.to_string(),
            group_id: group_id.map(str::to_string),
            username: username.map(str::to_string),
            done: done_tx,
        };

        if let Err(e) = sender.try_send(job) {
            return match e {
                mpsc::error::TrySendError::Full(_) => Err(MemoryError::Backpressure {
                    user_id: user_id.to_string(),
                }),
                mpsc::error::TrySendError::Closed(_) => {
                    warn!(user_id, "ingest worker gone, dropping job");
                    Err(MemoryError::Cancelled {
                        user_id: user_id.to_string(),
                    })
                }
            };
        }

        done_rx.await.map_err(|_| MemoryError::Cancelled {
            user_id: user_id.to_string(),
        })?
    }

    /// Search the user's memory. Returns up to `k` passages ranked by the
    /// fused fact/summary/graph signal; never errors on "nothing found".
    pub async fn search(
        &self,
        query: &str,
        user_id: &str,
        group_id: Option<&str>,
        k: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let mut filter = MetadataFilter::new().with("user_id", user_id);
        if let Some(group_id) = group_id {
            filter = filter.with("group_id", group_id);
        }
        self.coordinator.retrieve(query, k, &filter).await
    }

    /// Graph snapshot for external inspection.
    pub async fn get_graph(&self, filter: &PropertyFilter) -> GraphExport {
        self.coordinator.get_graph(filter).await
    }

    /// Distinct user ids known to the facts partition.
    pub async fn list_user_ids(&self) -> Result<Vec<String>, MemoryError> {
        self.coordinator.get_user_ids().await
    }

    /// Buffer one dialogue turn; summarize and ingest at the configured
    /// threshold.
    ///
    /// Sentinel handling: `%None%` drops the buffered turns, `%Hold%` keeps
    /// them so the next threshold crossing retries with more context.
    pub async fn observe_turn(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
        group_id: Option<&str>,
        username: Option<&str>,
    ) -> Result<TurnOutcome, MemoryError> {
        let snapshot = {
            let mut dialogues = self.dialogues.lock().await;
            let buffer = dialogues.entry(user_id.to_string()).or_default();
            buffer.turns.push((role.to_string(), content.to_string()));
            buffer.pending += 1;
            if buffer.pending < self.config.summarize_threshold.max(1) {
                return Ok(TurnOutcome::Buffered);
            }
            buffer.pending = 0;
            buffer.turns.clone()
        };

        let transcript = Summarizer::assemble_context(&snapshot);
        let raw = self.summarizer.summarize(&transcript).await?;

        match SummaryOutcome::interpret(&raw) {
            SummaryOutcome::Hold => {
                debug!(user_id, "summarizer deferred, keeping dialogue buffer");
                Ok(TurnOutcome::Held)
            }
            SummaryOutcome::Skip => {
                self.drain_buffer(user_id, snapshot.len()).await;
                debug!(user_id, "summarizer found nothing worth remembering");
                Ok(TurnOutcome::Skipped)
            }
            SummaryOutcome::Text(summary) => {
                self.add(&summary, user_id, group_id, username).await?;
                self.drain_buffer(user_id, snapshot.len()).await;
                Ok(TurnOutcome::Ingested)
            }
        }
    }

    /// Drop the first `count` buffered turns for `user_id`, keeping turns
    /// that arrived while the summarizer was running.
    async fn drain_buffer(&self, user_id: &str, count: usize) {
        let mut dialogues = self.dialogues.lock().await;
        if let Some(buffer) = dialogues.get_mut(user_id) {
            buffer.turns.drain(..count.min(buffer.turns.len()));
        }
    }

    /// Get or spawn the ingest worker for `user_id`.
    async fn worker_for(&self, user_id: &str) -> mpsc::Sender<IngestJob> {
        let mut workers = self.workers.lock().await;
        if let Some(sender) = workers.get(user_id) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let (tx, mut rx) = mpsc::channel::<IngestJob>(self.config.ingest_queue_bound.max(1));
        let coordinator = self.coordinator.clone();
        let user = user_id.to_string();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = coordinator
                    .ingest(
                        &job.text,
                        &user,
                        job.group_id.as_deref(),
                        job.username.as_deref(),
                    )
                    .await;
                if let Err(e) = &result {
                    warn!(user_id = %user, error = %e, "ingest failed");
                }
                let _ = job.done.send(result);
            }
            debug!(user_id = %user, "ingest worker stopped");
        });
        workers.insert(user_id.to_string(), tx.clone());
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::summarizer::{SENTINEL_HOLD, SENTINEL_NONE};
    use crate::test_support::{HashEmbedding, ScriptedLlm, script_simple_ingest};
    use async_trait::async_trait;
    use tempfile::TempDir;

    const DIM: usize = 64;

    fn config(dir: &TempDir) -> EngramConfig {
        EngramConfig {
            api_key: String::new(),
            api_base: "http://unused/v1".into(),
            model: "unused".into(),
            embedding_api_key: String::new(),
            embedding_api_base: "http://unused/v1".into(),
            embedding_model: "unused".into(),
            embedding_dimension: DIM,
            data_dir: dir.path().join("data").to_string_lossy().to_string(),
            temperature: None,
            max_tokens: None,
            ppr_alpha: 0.5,
            ingest_queue_bound: 32,
            summarize_threshold: 2,
        }
    }

    async fn engine(dir: &TempDir, llm: Arc<ScriptedLlm>) -> MemoryEngine {
        MemoryEngine::open(config(dir), llm, Arc::new(HashEmbedding::new(DIM)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_search_end_to_end() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        script_simple_ingest(&llm, "Alice", "Acme", "works_at", "Alice works at Acme.");
        let engine = engine(&dir, llm).await;

        engine
            .add("Alice works at Acme.", "u1", None, None)
            .await
            .unwrap();

        let hits = engine
            .search("Where does Alice work at Acme?", "u1", None, 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("Acme"));
        assert!(hits[0].score > 0.0);

        assert_eq!(engine.list_user_ids().await.unwrap(), vec!["u1".to_string()]);
        let export = engine.get_graph(&PropertyFilter::new()).await;
        assert!(!export.nodes.is_empty());
        assert!(!export.edges.is_empty());
    }

    #[tokio::test]
    async fn test_group_id_recorded_and_filterable() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        script_simple_ingest(&llm, "Alice", "Acme", "works_at", "Alice works at Acme.");
        let engine = engine(&dir, llm).await;

        engine
            .add("Alice works at Acme.", "u1", Some("g1"), None)
            .await
            .unwrap();

        // A group-scoped search still reaches the summary via its group.
        let hits = engine
            .search("Where does Alice work at Acme?", "u1", Some("g1"), 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("Acme"));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let llm = Arc::new(ScriptedLlm::new());
            script_simple_ingest(&llm, "Alice", "Acme", "works_at", "Alice works at Acme.");
            let engine = engine(&dir, llm).await;
            engine
                .add("Alice works at Acme.", "u1", None, None)
                .await
                .unwrap();
        }

        // Fresh engine over the same data directory sees the same state.
        let llm = Arc::new(ScriptedLlm::new());
        let reopened = engine(&dir, llm).await;
        let hits = reopened
            .search("Where does Alice work at Acme?", "u1", None, 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("Acme"));

        let export = reopened.get_graph(&PropertyFilter::new()).await;
        assert_eq!(export.nodes.len(), 3); // Alice, Acme, one passage
        assert_eq!(export.edges.len(), 3); // one phase edge, two passage edges
    }

    /// Chat provider whose calls stall until permits are released, to make
    /// queue states observable.
    struct GatedLlm {
        inner: ScriptedLlm,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl LlmProvider for GatedLlm {
        async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, MemoryError> {
            let _permit = self.gate.acquire().await.expect("gate open");
            self.inner.chat(system_prompt, user_prompt).await
        }
    }

    #[tokio::test]
    async fn test_backpressure_fails_fast() {
        let dir = TempDir::new().unwrap();
        let gated = Arc::new(GatedLlm {
            inner: ScriptedLlm::new(),
            gate: tokio::sync::Semaphore::new(0),
        });

        let mut cfg = config(&dir);
        cfg.ingest_queue_bound = 1;
        let engine = Arc::new(
            MemoryEngine::open(cfg, gated.clone(), Arc::new(HashEmbedding::new(DIM)))
                .await
                .unwrap(),
        );

        // First add is picked up by the worker and stalls on the gate;
        // second fills the queue slot.
        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add("one", "u1", None, None).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add("two", "u1", None, None).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Third producer outruns the bound and fails fast.
        let err = engine.add("three", "u1", None, None).await.unwrap_err();
        assert!(matches!(err, MemoryError::Backpressure { .. }));

        // Releasing the gate drains the queue; both queued ingests finish.
        gated.gate.add_permits(100);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_observe_turn_thresholds_and_sentinels() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        // First attempt defers, second produces a summary, third finds
        // nothing worth keeping.
        llm.push_summaries(SENTINEL_HOLD);
        llm.push_summaries("Alice works at Acme.");
        script_simple_ingest(&llm, "Alice", "Acme", "works_at", "Alice works at Acme.");
        llm.push_summaries(SENTINEL_NONE);
        let engine = engine(&dir, llm).await;

        // Threshold is 2 turns.
        assert_eq!(
            engine
                .observe_turn("u1", "user", "hi", None, None)
                .await
                .unwrap(),
            TurnOutcome::Buffered
        );
        assert_eq!(
            engine
                .observe_turn("u1", "assistant", "hello! tell me more", None, None)
                .await
                .unwrap(),
            TurnOutcome::Held
        );

        // The held turns stay buffered; two more turns retry with context.
        assert_eq!(
            engine
                .observe_turn("u1", "user", "I work at Acme", None, None)
                .await
                .unwrap(),
            TurnOutcome::Buffered
        );
        assert_eq!(
            engine
                .observe_turn("u1", "assistant", "noted", None, None)
                .await
                .unwrap(),
            TurnOutcome::Ingested
        );

        let hits = engine
            .search("Where does Alice work at Acme?", "u1", None, 5)
            .await
            .unwrap();
        assert!(!hits.is_empty());

        // A buffer summarized to %None% is dropped.
        engine
            .observe_turn("u1", "user", "blah", None, None)
            .await
            .unwrap();
        assert_eq!(
            engine
                .observe_turn("u1", "user", "blah blah", None, None)
                .await
                .unwrap(),
            TurnOutcome::Skipped
        );
        assert!(engine.dialogues.lock().await.get("u1").unwrap().turns.is_empty());
    }

    #[tokio::test]
    async fn test_cross_user_ingests_run_independently() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        script_simple_ingest(&llm, "Alice", "Acme", "works_at", "Alice works at Acme.");
        script_simple_ingest(&llm, "Bob", "Beta", "works_at", "Bob works at Beta.");
        let engine = Arc::new(engine(&dir, llm).await);

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add("Alice works at Acme.", "u1", None, None).await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add("Bob works at Beta.", "u2", None, None).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let mut users = engine.list_user_ids().await.unwrap();
        users.sort();
        assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);
    }
}
