//! Storage collaborator traits.
//!
//! The engine never owns storage lifetimes; it holds shared references to a
//! [`RecordStore`] and a [`VectorIndex`] and treats both as externally
//! lifetime-managed resources. Every fact, summary, and triplet operation is
//! keyed by an explicit owner identifier; no cross-owner leakage is permitted.

use crate::Result;
use crate::models::{Checkpoint, Fact, FactId, Triplet};
use chrono::{DateTime, Utc};

/// A category's persistent summary: an append-only, time-windowed digest of
/// facts older than the staleness window.
///
/// The `updated_at` timestamp is the rolling-window lower bound for the next
/// digest pass, so the same facts are not re-summarized twice.
#[derive(Debug, Clone)]
pub struct PersistentSummary {
    /// Accumulated digest blocks (append-only).
    pub content: String,
    /// When the last digest block was appended.
    pub updated_at: DateTime<Utc>,
}

/// Trait for durable record stores.
///
/// Implementations are the authoritative source of truth for resources,
/// facts, category summaries, relational triplets, and checkpoints.
/// Methods take `&self`; implementations use interior mutability so the
/// store can be shared via `Arc<dyn RecordStore>`.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    // ── Resources ──

    /// Stores a raw conversational resource and returns its identifier.
    async fn save_resource(&self, owner_id: &str, content: &str) -> Result<String>;

    /// Retrieves a resource's text by identifier.
    async fn get_resource(&self, resource_id: &str) -> Result<Option<String>>;

    /// Keyword-searches resource text for an owner, newest first, bounded.
    async fn search_resources(&self, owner_id: &str, query: &str) -> Result<Vec<String>>;

    // ── Facts ──

    /// Stores a fact (insert or replace by ID).
    async fn save_fact(&self, fact: &Fact) -> Result<()>;

    /// Retrieves a non-archived fact by ID.
    async fn get_fact(&self, id: &FactId) -> Result<Option<Fact>>;

    /// Updates a fact's mutable columns (content, category, embedding,
    /// access counter, accessed-at, archived flag).
    async fn update_fact(&self, fact: &Fact) -> Result<()>;

    /// Physically deletes facts by ID. Only consolidation merges do this.
    async fn delete_facts(&self, ids: &[FactId]) -> Result<()>;

    /// Lists all non-archived facts for an owner.
    async fn list_facts(&self, owner_id: &str) -> Result<Vec<Fact>>;

    /// Keyword-searches non-archived fact content, newest first, bounded.
    async fn search_facts(&self, owner_id: &str, query: &str) -> Result<Vec<Fact>>;

    /// Non-archived facts created before `cutoff`, oldest first.
    async fn facts_created_before(
        &self,
        owner_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Fact>>;

    /// Non-archived facts not accessed since `cutoff`.
    async fn facts_not_accessed_since(
        &self,
        owner_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Fact>>;

    /// Non-archived facts with at least `min_count` accesses, hottest first.
    async fn facts_with_min_access(&self, owner_id: &str, min_count: u32) -> Result<Vec<Fact>>;

    // ── Category summaries ──

    /// Writes a category's general summary (full rewrite).
    async fn save_general_summary(
        &self,
        owner_id: &str,
        category: &str,
        summary: &str,
    ) -> Result<()>;

    /// Loads a category's general summary.
    async fn load_general_summary(&self, owner_id: &str, category: &str)
    -> Result<Option<String>>;

    /// Lists the owner's known categories.
    async fn list_categories(&self, owner_id: &str) -> Result<Vec<String>>;

    /// Loads a category's persistent summary with its last-update timestamp.
    async fn load_persistent_summary(
        &self,
        owner_id: &str,
        category: &str,
    ) -> Result<Option<PersistentSummary>>;

    /// Appends a digest block to a category's persistent summary and advances
    /// its last-update timestamp. Prior blocks are never rewritten.
    async fn append_persistent_summary(
        &self,
        owner_id: &str,
        category: &str,
        block: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    // ── Triplets ──

    /// Appends a relational triplet.
    async fn save_triplet(&self, owner_id: &str, triplet: &Triplet) -> Result<()>;

    /// Active triplets for an owner, optionally filtered by subject.
    async fn active_triplets(&self, owner_id: &str, subject: Option<&str>)
    -> Result<Vec<Triplet>>;

    /// Retires all active rows for (owner, subject, predicate): marks them
    /// inactive with status `past_replaced`. Returns the number retired.
    async fn deactivate_triplets(
        &self,
        owner_id: &str,
        subject: &str,
        predicate: &str,
    ) -> Result<usize>;

    // ── Checkpoints ──

    /// Stores a checkpoint (insert or replace by thread and step).
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// The most recent checkpoint for a thread.
    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// The checkpoint at a specific step, if any.
    async fn checkpoint_at(&self, thread_id: &str, step_id: &str) -> Result<Option<Checkpoint>>;

    /// Step identifiers for a thread in insertion order.
    async fn list_checkpoint_steps(&self, thread_id: &str) -> Result<Vec<String>>;
}
