//! The engine facade: one type wiring storage, collaborators, and services.

use crate::embedding::Embedder;
use crate::llm::TextGenerator;
use crate::services::{
    CandidateAggregator, CaptureService, ConsolidationEngine, MaintenanceReport, MemorizeOutcome,
    PreparedInput, RankerConfig, RecallOptions, RecallService, RelevanceRanker, ShortTermMemory,
};
use crate::storage::{RecordStore, VectorIndex};
use crate::Result;
use std::sync::Arc;

/// Long-term memory engine for one owner.
///
/// Wires the capture, recall, and consolidation services over a shared
/// record store and optional vector capability. The store, index, and
/// collaborators are externally lifetime-managed; the engine only holds
/// shared references.
///
/// ```rust,ignore
/// let memory = Memory::new("u1", store, llm).with_vector_index(index, embedder);
/// memory.memorize("I moved to the infra team").await?;
/// let context = memory.retrieve("what team am I on?").await?;
/// ```
pub struct Memory {
    owner_id: String,
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn TextGenerator>,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    ranker_config: RankerConfig,
    capture: CaptureService,
    recall: RecallService,
    consolidation: ConsolidationEngine,
}

impl Memory {
    /// Creates an engine for `owner_id` without vector recall.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        store: Arc<dyn RecordStore>,
        llm: Arc<dyn TextGenerator>,
    ) -> Self {
        Self::assemble(owner_id.into(), store, llm, None, None, RankerConfig::default())
    }

    /// Enables the vector recall path with an index and an embedder.
    #[must_use]
    pub fn with_vector_index(
        self,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self::assemble(
            self.owner_id,
            self.store,
            self.llm,
            Some(index),
            Some(embedder),
            self.ranker_config,
        )
    }

    /// Overrides the ranker configuration.
    #[must_use]
    pub fn with_ranker_config(self, config: RankerConfig) -> Self {
        Self::assemble(
            self.owner_id,
            self.store,
            self.llm,
            self.index,
            self.embedder,
            config,
        )
    }

    fn assemble(
        owner_id: String,
        store: Arc<dyn RecordStore>,
        llm: Arc<dyn TextGenerator>,
        index: Option<Arc<dyn VectorIndex>>,
        embedder: Option<Arc<dyn Embedder>>,
        ranker_config: RankerConfig,
    ) -> Self {
        let capture = CaptureService::new(store.clone(), llm.clone(), index.clone(), embedder.clone());
        let aggregator =
            CandidateAggregator::new(store.clone(), llm.clone(), index.clone(), embedder.clone());
        let ranker = RelevanceRanker::new(store.clone(), ranker_config);
        let recall = RecallService::new(store.clone(), llm.clone(), aggregator, ranker);
        let consolidation =
            ConsolidationEngine::new(store.clone(), llm.clone(), index.clone(), embedder.clone());
        Self {
            owner_id,
            store,
            llm,
            index,
            embedder,
            ranker_config,
            capture,
            recall,
            consolidation,
        }
    }

    /// The owner this engine serves.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Memorizes conversation text end to end.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, storage failures, or collaborator
    /// output that stays malformed after retries.
    pub async fn memorize(&self, text: &str) -> Result<MemorizeOutcome> {
        self.capture.memorize(&self.owner_id, text).await
    }

    /// Memorizes with pre-extracted facts, triplets, or verbatim summaries.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, storage failures, or collaborator
    /// output that stays malformed after retries.
    pub async fn memorize_prepared(
        &self,
        text: &str,
        prepared: PreparedInput,
    ) -> Result<MemorizeOutcome> {
        self.capture
            .memorize_prepared(&self.owner_id, text, prepared)
            .await
    }

    /// Retrieves a context block for a user message with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or a non-degradable collaborator
    /// contract stays malformed after retries.
    pub async fn retrieve(&self, message: &str) -> Result<String> {
        self.recall
            .retrieve(&self.owner_id, message, RecallOptions::default())
            .await
    }

    /// Retrieves with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or a non-degradable collaborator
    /// contract stays malformed after retries.
    pub async fn retrieve_with(&self, message: &str, options: RecallOptions) -> Result<String> {
        self.recall.retrieve(&self.owner_id, message, options).await
    }

    /// Returns a checkpoint handle for one conversation thread.
    #[must_use]
    pub fn checkpoint(&self, thread_id: impl Into<String>) -> ShortTermMemory {
        ShortTermMemory::new(thread_id, self.store.clone())
    }

    /// Runs all three consolidation tiers for this owner.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure; collaborator failures inside a
    /// tier skip the affected group.
    pub async fn maintain(&self) -> Result<MaintenanceReport> {
        self.consolidation.run_all(&self.owner_id).await
    }

    /// The consolidation engine, for callers scheduling tiers separately.
    #[must_use]
    pub fn consolidation(&self) -> &ConsolidationEngine {
        &self.consolidation
    }
}
