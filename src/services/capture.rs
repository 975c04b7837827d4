//! The memorize pipeline: conversation text in, durable memory out.

use crate::embedding::Embedder;
use crate::llm::{self, TextGenerator, prompts};
use crate::models::{Fact, Triplet, TripletStatus};
use crate::services::conflict::ConflictResolver;
use crate::storage::{RecordKind, RecordStore, VectorIndex, VectorMetadata};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A fact as extracted by the collaborator (or supplied pre-extracted).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedFact {
    /// The fact content.
    pub content: String,
    /// Category suggested at extraction time.
    #[serde(default)]
    pub category_hint: Option<String>,
    /// Final category, when the caller already classified the fact.
    #[serde(default)]
    pub category: Option<String>,
}

/// A triplet as extracted by the collaborator (or supplied pre-extracted).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedTriplet {
    /// Subject entity.
    pub subject: String,
    /// Relation name.
    pub predicate: String,
    /// Object entity or value.
    pub object: String,
    /// Status string; unknown or missing values become `uncertain`/`current`.
    #[serde(default)]
    pub status: Option<String>,
}

impl ExtractedTriplet {
    fn into_triplet(self) -> Triplet {
        let status = self
            .status
            .as_deref()
            .map_or(TripletStatus::Current, TripletStatus::parse);
        Triplet::new(self.subject, self.predicate, self.object, status)
    }
}

/// Pre-extracted input for tool mode, where the calling agent already ran
/// extraction and classification itself.
#[derive(Debug, Clone, Default)]
pub struct PreparedInput {
    /// Pre-extracted facts; `None` means extract from the text.
    pub facts: Option<Vec<ExtractedFact>>,
    /// Pre-extracted triplets; `None` means extract from the text.
    pub triplets: Option<Vec<ExtractedTriplet>>,
    /// Category summaries to write verbatim instead of evolving them.
    pub summaries: Option<HashMap<String, String>>,
}

/// What one memorize call changed.
#[derive(Debug, Clone)]
pub struct MemorizeOutcome {
    /// Identifier of the saved raw resource.
    pub resource_id: String,
    /// Facts stored.
    pub facts_stored: usize,
    /// Triplets appended to the graph.
    pub triplets_stored: usize,
    /// Graph rows retired by supersession.
    pub triplets_retired: usize,
    /// Categories whose general summary changed.
    pub categories_updated: usize,
}

impl MemorizeOutcome {
    /// One-line human-readable account of the call.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "stored {} facts and {} triplets ({} retired), updated {} summaries",
            self.facts_stored, self.triplets_stored, self.triplets_retired, self.categories_updated
        )
    }
}

/// Turns conversation text into stored facts, evolved category summaries,
/// and conflict-checked relational triplets.
pub struct CaptureService {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn TextGenerator>,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    resolver: ConflictResolver,
}

impl CaptureService {
    /// Creates a capture service over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        llm: Arc<dyn TextGenerator>,
        index: Option<Arc<dyn VectorIndex>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        let resolver = ConflictResolver::new(store.clone(), llm.clone());
        Self {
            store,
            llm,
            index,
            embedder,
            resolver,
        }
    }

    /// Memorizes conversation text end to end: extraction, classification,
    /// embedding, summary evolution, and graph capture.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, storage failures, or collaborator
    /// output that stays malformed after retries.
    pub async fn memorize(&self, owner_id: &str, text: &str) -> Result<MemorizeOutcome> {
        self.memorize_prepared(owner_id, text, PreparedInput::default())
            .await
    }

    /// Memorizes with optional pre-extracted facts, triplets, or verbatim
    /// summaries; each `Some` field skips the corresponding collaborator
    /// call.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, storage failures, or collaborator
    /// output that stays malformed after retries.
    pub async fn memorize_prepared(
        &self,
        owner_id: &str,
        text: &str,
        prepared: PreparedInput,
    ) -> Result<MemorizeOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("memorize requires text".to_string()));
        }
        let resource_id = self.store.save_resource(owner_id, text).await?;

        let provided_facts = prepared.facts.is_some();
        let extracted = match prepared.facts {
            Some(facts) => facts,
            None => llm::parse_json(&self.llm, &prompts::extract_facts(text)).await?,
        };
        let classified = if provided_facts {
            // Tool mode: trust the caller's categories, fall back to hints.
            extracted
                .into_iter()
                .map(|f| {
                    let category = f
                        .category
                        .or(f.category_hint)
                        .unwrap_or_else(|| "general".to_string());
                    (f.content, category)
                })
                .collect()
        } else {
            self.classify(owner_id, extracted).await?
        };

        let mut by_category: HashMap<String, Vec<String>> = HashMap::new();
        let mut facts_stored = 0;
        for (content, category) in classified {
            if content.trim().is_empty() {
                continue;
            }
            by_category
                .entry(category.clone())
                .or_default()
                .push(content.clone());
            let mut fact = Fact::new(owner_id, content, category).with_source(&resource_id);
            if let Some(embedder) = &self.embedder {
                let embedding = embedder.embed(&fact.content).await?;
                fact = fact.with_embedding(embedding);
            }
            self.store.save_fact(&fact).await?;
            self.index_fact(&fact).await?;
            facts_stored += 1;
        }

        let categories_updated = if let Some(summaries) = prepared.summaries {
            let count = summaries.len();
            for (category, summary) in summaries {
                self.store
                    .save_general_summary(owner_id, &category, &summary)
                    .await?;
            }
            count
        } else {
            self.evolve_summaries(owner_id, &by_category).await?
        };

        let raw_triplets = match prepared.triplets {
            Some(triplets) => triplets,
            None => {
                if provided_facts {
                    // Tool-mode fact capture without triplets skips graph
                    // extraction entirely.
                    Vec::new()
                } else {
                    llm::parse_json(&self.llm, &prompts::extract_triplets(text)).await?
                }
            }
        };
        let mut triplets_stored = 0;
        let mut triplets_retired = 0;
        for raw in raw_triplets {
            let triplet = raw.into_triplet();
            triplets_retired += self.resolver.commit(owner_id, &triplet).await?;
            triplets_stored += 1;
        }

        self.index_conversation(owner_id, &resource_id, text).await?;

        let outcome = MemorizeOutcome {
            resource_id,
            facts_stored,
            triplets_stored,
            triplets_retired,
            categories_updated,
        };
        tracing::info!(owner_id, outcome = %outcome.summary(), "memorized");
        Ok(outcome)
    }

    /// Classifies extracted facts against the owner's existing categories.
    /// When the owner has no categories yet and every fact carries a hint,
    /// the hints are used directly without a collaborator call.
    async fn classify(
        &self,
        owner_id: &str,
        extracted: Vec<ExtractedFact>,
    ) -> Result<Vec<(String, String)>> {
        if extracted.is_empty() {
            return Ok(Vec::new());
        }
        let categories = self.store.list_categories(owner_id).await?;
        if categories.is_empty() && extracted.iter().all(|f| f.category_hint.is_some()) {
            return Ok(extracted
                .into_iter()
                .map(|f| {
                    let category = f.category_hint.unwrap_or_else(|| "general".to_string());
                    (f.content, category)
                })
                .collect());
        }

        let items = extracted
            .iter()
            .map(|f| format!("- {}", f.content))
            .collect::<Vec<_>>()
            .join("\n");
        let listing = if categories.is_empty() {
            "(none yet - create new ones)".to_string()
        } else {
            categories.join(", ")
        };

        #[derive(Deserialize)]
        struct Classified {
            content: String,
            #[serde(default)]
            category: Option<String>,
        }
        let classified: Vec<Classified> =
            llm::parse_json(&self.llm, &prompts::classify_facts(&listing, &items)).await?;
        Ok(classified
            .into_iter()
            .map(|c| {
                let category = c.category.unwrap_or_else(|| "general".to_string());
                (c.content, category)
            })
            .collect())
    }

    /// Evolves each touched category's general summary with the new facts.
    async fn evolve_summaries(
        &self,
        owner_id: &str,
        by_category: &HashMap<String, Vec<String>>,
    ) -> Result<usize> {
        let mut updated = 0;
        for (category, contents) in by_category {
            let existing = self
                .store
                .load_general_summary(owner_id, category)
                .await?
                .unwrap_or_else(|| "No existing summary.".to_string());
            let items = contents
                .iter()
                .map(|c| format!("- {c}"))
                .collect::<Vec<_>>()
                .join("\n");
            let evolved = self
                .llm
                .complete(&prompts::evolve_summary(category, &existing, &items))
                .await?;
            self.store
                .save_general_summary(owner_id, category, evolved.trim())
                .await?;
            updated += 1;
        }
        Ok(updated)
    }

    async fn index_fact(&self, fact: &Fact) -> Result<()> {
        let (Some(index), Some(embedding)) = (&self.index, &fact.embedding) else {
            return Ok(());
        };
        index
            .add(
                fact.id.as_str(),
                &fact.content,
                embedding,
                VectorMetadata {
                    owner_id: fact.owner_id.clone(),
                    kind: RecordKind::Fact,
                    category: Some(fact.category.clone()),
                    created_at: fact.created_at,
                    accessed_at: fact.accessed_at,
                },
            )
            .await
    }

    /// Indexes the raw conversation under its resource ID so semantically
    /// related raw context is recallable later.
    async fn index_conversation(
        &self,
        owner_id: &str,
        resource_id: &str,
        text: &str,
    ) -> Result<()> {
        let (Some(index), Some(embedder)) = (&self.index, &self.embedder) else {
            return Ok(());
        };
        let embedding = embedder.embed(text).await?;
        let now = chrono::Utc::now();
        index
            .add(
                resource_id,
                text,
                &embedding,
                VectorMetadata {
                    owner_id: owner_id.to_string(),
                    kind: RecordKind::Conversation,
                    category: None,
                    created_at: now,
                    accessed_at: now,
                },
            )
            .await
    }
}
