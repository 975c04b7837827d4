//! Three-tier consolidation: dedup/reinforce, digest/archive, re-embed.
//!
//! Each tier is an owner-scoped batch job. One cluster's or category's
//! collaborator failure skips that group and the batch continues; the skip
//! is logged, not surfaced.

use crate::embedding::Embedder;
use crate::llm::{TextGenerator, prompts};
use crate::models::{Fact, FactId};
use crate::storage::vector::cosine_similarity;
use crate::storage::{RecordKind, RecordStore, VectorIndex, VectorMetadata};
use crate::Result;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Cosine similarity above which two facts are considered duplicates.
const MERGE_SIMILARITY: f32 = 0.95;
/// Access count a fact must exceed to be reinforced.
const PROMOTION_MIN_ACCESS: u32 = 5;
/// Age in days past which facts are digested into the persistent summary.
const DIGEST_AGE_DAYS: i64 = 30;
/// Idle days before a fact is soft-archived.
const SOFT_ARCHIVE_IDLE_DAYS: i64 = 90;
/// Idle days before the infrequent tier archives a fact outright.
const HARD_ARCHIVE_IDLE_DAYS: i64 = 180;

/// Outcome of the frequent tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequentStats {
    /// Facts folded into a survivor and deleted.
    pub merged: usize,
    /// High-access facts reinforced.
    pub promoted: usize,
    /// Category general summaries rewritten.
    pub summaries_rewritten: usize,
}

impl FrequentStats {
    /// One-line human-readable account.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "merged {} duplicates, promoted {} facts, rewrote {} summaries",
            self.merged, self.promoted, self.summaries_rewritten
        )
    }
}

/// Outcome of the periodic tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodicStats {
    /// Categories that received a new persistent-summary digest block.
    pub digested: usize,
    /// Facts soft-archived for idleness.
    pub archived: usize,
}

impl PeriodicStats {
    /// One-line human-readable account.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "digested {} categories, archived {} idle facts",
            self.digested, self.archived
        )
    }
}

/// Outcome of the infrequent tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfrequentStats {
    /// Facts re-embedded and re-indexed.
    pub reindexed: usize,
    /// Facts hard-archived for long idleness.
    pub archived: usize,
}

impl InfrequentStats {
    /// One-line human-readable account.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "reindexed {} facts, archived {} dead facts",
            self.reindexed, self.archived
        )
    }
}

/// Combined outcome of a full maintenance run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceReport {
    /// Frequent-tier stats.
    pub frequent: FrequentStats,
    /// Periodic-tier stats.
    pub periodic: PeriodicStats,
    /// Infrequent-tier stats.
    pub infrequent: InfrequentStats,
}

impl MaintenanceReport {
    /// Multi-line human-readable account.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "frequent: {}\nperiodic: {}\ninfrequent: {}",
            self.frequent.summary(),
            self.periodic.summary(),
            self.infrequent.summary()
        )
    }
}

/// Runs the consolidation tiers for one owner.
///
/// Callers are expected to run at most one consolidation per owner at a
/// time; concurrent retrieval against the same owner is tolerated and may
/// observe pre- or post-consolidation state.
pub struct ConsolidationEngine {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn TextGenerator>,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ConsolidationEngine {
    /// Creates a consolidation engine over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        llm: Arc<dyn TextGenerator>,
        index: Option<Arc<dyn VectorIndex>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            store,
            llm,
            index,
            embedder,
        }
    }

    /// Frequent tier: merge near-duplicates, reinforce hot facts, rewrite
    /// general summaries from the current fact set.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure. Collaborator failures skip the
    /// affected cluster or category.
    pub async fn run_frequent(&self, owner_id: &str) -> Result<FrequentStats> {
        let mut stats = FrequentStats::default();
        let facts = self.store.list_facts(owner_id).await?;

        stats.merged = self.merge_duplicates(owner_id, &facts).await?;

        let hot = self
            .store
            .facts_with_min_access(owner_id, PROMOTION_MIN_ACCESS + 1)
            .await?;
        for mut fact in hot {
            fact.access_count += 1;
            self.store.update_fact(&fact).await?;
            stats.promoted += 1;
        }

        stats.summaries_rewritten = self.rewrite_summaries(owner_id).await?;
        tracing::info!(owner_id, outcome = %stats.summary(), "frequent consolidation done");
        Ok(stats)
    }

    /// Periodic tier: digest aging facts into the persistent summary and
    /// soft-archive idle ones.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure. Collaborator failures skip the
    /// affected category.
    pub async fn run_periodic(&self, owner_id: &str) -> Result<PeriodicStats> {
        let mut stats = PeriodicStats::default();
        let now = Utc::now();

        let aging = self
            .store
            .facts_created_before(owner_id, now - Duration::days(DIGEST_AGE_DAYS))
            .await?;
        let mut by_category: HashMap<String, Vec<&Fact>> = HashMap::new();
        for fact in &aging {
            by_category.entry(fact.category.clone()).or_default().push(fact);
        }

        for (category, facts) in by_category {
            // The persistent summary's own timestamp is the rolling lower
            // bound: facts digested in an earlier pass stay out.
            let window_start = self
                .store
                .load_persistent_summary(owner_id, &category)
                .await?
                .map(|s| s.updated_at);
            let fresh: Vec<&&Fact> = facts
                .iter()
                .filter(|f| window_start.is_none_or(|start| f.created_at > start))
                .collect();
            if fresh.is_empty() {
                continue;
            }

            let items = fresh
                .iter()
                .map(|f| format!("- {}", f.content))
                .collect::<Vec<_>>()
                .join("\n");
            match self
                .llm
                .complete(&prompts::digest_facts(&category, &items))
                .await
            {
                Ok(digest) => {
                    let mut block = format!("## {}\n", now.format("%Y-%m-%d"));
                    let _ = write!(block, "{}", digest.trim());
                    self.store
                        .append_persistent_summary(owner_id, &category, &block, now)
                        .await?;
                    stats.digested += 1;
                }
                Err(err) => {
                    tracing::warn!(owner_id, category, error = %err, "digest skipped");
                }
            }
        }

        stats.archived = self
            .archive_idle(owner_id, SOFT_ARCHIVE_IDLE_DAYS)
            .await?;
        tracing::info!(owner_id, outcome = %stats.summary(), "periodic consolidation done");
        Ok(stats)
    }

    /// Infrequent tier: re-embed everything, rebuild the index, and archive
    /// facts idle past the hard limit.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure. Embedding failures skip the
    /// affected fact.
    pub async fn run_infrequent(&self, owner_id: &str) -> Result<InfrequentStats> {
        let mut stats = InfrequentStats::default();

        if let (Some(index), Some(embedder)) = (&self.index, &self.embedder) {
            let facts = self.store.list_facts(owner_id).await?;
            for mut fact in facts {
                let embedding = match embedder.embed(&fact.content).await {
                    Ok(embedding) => embedding,
                    Err(err) => {
                        tracing::warn!(owner_id, fact_id = %fact.id, error = %err, "re-embed skipped");
                        continue;
                    }
                };
                fact.embedding = Some(embedding.clone());
                self.store.update_fact(&fact).await?;
                index
                    .add(
                        fact.id.as_str(),
                        &fact.content,
                        &embedding,
                        VectorMetadata {
                            owner_id: fact.owner_id.clone(),
                            kind: RecordKind::Fact,
                            category: Some(fact.category.clone()),
                            created_at: fact.created_at,
                            accessed_at: fact.accessed_at,
                        },
                    )
                    .await?;
                stats.reindexed += 1;
            }
            index.rebuild().await?;
        }

        stats.archived = self
            .archive_idle(owner_id, HARD_ARCHIVE_IDLE_DAYS)
            .await?;
        tracing::info!(owner_id, outcome = %stats.summary(), "infrequent consolidation done");
        Ok(stats)
    }

    /// Runs all three tiers in order.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub async fn run_all(&self, owner_id: &str) -> Result<MaintenanceReport> {
        Ok(MaintenanceReport {
            frequent: self.run_frequent(owner_id).await?,
            periodic: self.run_periodic(owner_id).await?,
            infrequent: self.run_infrequent(owner_id).await?,
        })
    }

    /// Clusters embedded facts above the similarity bar (first seen wins as
    /// survivor), folds each cluster into its survivor via the collaborator,
    /// and deletes the rest.
    async fn merge_duplicates(&self, owner_id: &str, facts: &[Fact]) -> Result<usize> {
        let embedded: Vec<&Fact> = facts.iter().filter(|f| f.embedding.is_some()).collect();
        if embedded.len() < 2 {
            return Ok(0);
        }

        let mut merged_total = 0;
        let mut consumed: std::collections::HashSet<&FactId> = std::collections::HashSet::new();
        for (i, seed) in embedded.iter().enumerate() {
            if consumed.contains(&seed.id) {
                continue;
            }
            let Some(seed_embedding) = &seed.embedding else {
                continue;
            };
            let mut cluster: Vec<&Fact> = vec![seed];
            for other in embedded.iter().skip(i + 1) {
                if consumed.contains(&other.id) {
                    continue;
                }
                let Some(other_embedding) = &other.embedding else {
                    continue;
                };
                if cosine_similarity(seed_embedding, other_embedding) > MERGE_SIMILARITY {
                    cluster.push(other);
                    consumed.insert(&other.id);
                }
            }
            if cluster.len() < 2 {
                continue;
            }

            let combined = cluster
                .iter()
                .map(|f| f.content.as_str())
                .collect::<Vec<_>>()
                .join(" | ");
            let merged_content = match self
                .llm
                .complete(&prompts::compress_facts(&combined))
                .await
            {
                Ok(content) => content.trim().to_string(),
                Err(err) => {
                    tracing::warn!(owner_id, error = %err, "merge skipped for one cluster");
                    continue;
                }
            };

            let mut survivor = (*cluster[0]).clone();
            survivor.content = merged_content;
            if let Some(embedder) = &self.embedder {
                match embedder.embed(&survivor.content).await {
                    Ok(embedding) => survivor.embedding = Some(embedding),
                    Err(err) => {
                        tracing::warn!(owner_id, error = %err, "survivor kept stale embedding");
                    }
                }
            }
            self.store.update_fact(&survivor).await?;

            let losers: Vec<FactId> = cluster[1..].iter().map(|f| f.id.clone()).collect();
            self.store.delete_facts(&losers).await?;
            if let Some(index) = &self.index {
                let ids: Vec<String> = losers.iter().map(|id| id.as_str().to_string()).collect();
                index.delete(&ids).await?;
                if let Some(embedding) = &survivor.embedding {
                    index
                        .add(
                            survivor.id.as_str(),
                            &survivor.content,
                            embedding,
                            VectorMetadata {
                                owner_id: survivor.owner_id.clone(),
                                kind: RecordKind::Fact,
                                category: Some(survivor.category.clone()),
                                created_at: survivor.created_at,
                                accessed_at: survivor.accessed_at,
                            },
                        )
                        .await?;
                }
            }
            merged_total += losers.len();
        }
        Ok(merged_total)
    }

    /// Rewrites each category's general summary from its full current fact
    /// set, so drifted summaries re-anchor to what is actually stored.
    async fn rewrite_summaries(&self, owner_id: &str) -> Result<usize> {
        let facts = self.store.list_facts(owner_id).await?;
        let mut by_category: HashMap<String, Vec<&str>> = HashMap::new();
        for fact in &facts {
            by_category
                .entry(fact.category.clone())
                .or_default()
                .push(&fact.content);
        }

        let mut rewritten = 0;
        for (category, contents) in by_category {
            let existing = self
                .store
                .load_general_summary(owner_id, &category)
                .await?
                .unwrap_or_else(|| "No existing summary.".to_string());
            let items = contents
                .iter()
                .map(|c| format!("- {c}"))
                .collect::<Vec<_>>()
                .join("\n");
            match self
                .llm
                .complete(&prompts::evolve_summary(&category, &existing, &items))
                .await
            {
                Ok(updated) => {
                    self.store
                        .save_general_summary(owner_id, &category, updated.trim())
                        .await?;
                    rewritten += 1;
                }
                Err(err) => {
                    tracing::warn!(owner_id, category, error = %err, "summary rewrite skipped");
                }
            }
        }
        Ok(rewritten)
    }

    /// Soft-archives facts idle for more than `idle_days` and drops them
    /// from the vector index.
    async fn archive_idle(&self, owner_id: &str, idle_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(idle_days);
        let stale = self.store.facts_not_accessed_since(owner_id, cutoff).await?;
        let mut archived = 0;
        for mut fact in stale {
            fact.archived = true;
            self.store.update_fact(&fact).await?;
            if let Some(index) = &self.index {
                index.delete(&[fact.id.as_str().to_string()]).await?;
            }
            archived += 1;
        }
        Ok(archived)
    }
}
