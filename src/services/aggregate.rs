//! Candidate aggregation across the three recall paths.
//!
//! The aggregator is read-only: it never mutates stored records. Scoring
//! normalization, decay, and selection belong to the ranker.

use crate::embedding::Embedder;
use crate::llm::{self, TextGenerator, prompts};
use crate::models::{ScoredResult, Triplet};
use crate::storage::{RecordKind, RecordStore, VectorFilter, VectorIndex};
use crate::Result;
use std::sync::Arc;

/// Fixed raw score for a lexical (substring) hit.
const LEXICAL_SCORE: f32 = 0.8;
/// How many nearest neighbors the vector path requests.
const VECTOR_TOP_K: usize = 20;
/// Raw score for a triplet whose subject matched a query entity directly.
const GRAPH_DIRECT_SCORE: f32 = 0.8;
/// Raw score for a triplet reached by one-hop expansion through an object.
const GRAPH_HOP_SCORE: f32 = 0.6;
/// Fallback subject when entity resolution yields no graph hits.
const DEFAULT_ENTITY: &str = "User";

/// Which recall paths a retrieval runs.
#[derive(Debug, Clone, Copy)]
pub struct SourceSelector {
    /// Substring search over stored fact content.
    pub lexical: bool,
    /// Nearest-neighbor search over the vector index.
    pub vector: bool,
    /// Relational-graph traversal.
    pub graph: bool,
    /// Widen the vector path to raw conversation records (owner-only
    /// filter) in addition to facts.
    pub conversations: bool,
}

impl Default for SourceSelector {
    fn default() -> Self {
        Self::all()
    }
}

impl SourceSelector {
    /// All three paths, facts only on the vector path.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            lexical: true,
            vector: true,
            graph: true,
            conversations: false,
        }
    }

    /// Vector path only.
    #[must_use]
    pub const fn vector_only() -> Self {
        Self {
            lexical: false,
            vector: true,
            graph: false,
            conversations: false,
        }
    }

    /// Graph path only.
    #[must_use]
    pub const fn graph_only() -> Self {
        Self {
            lexical: false,
            vector: false,
            graph: true,
            conversations: false,
        }
    }

    /// Includes raw conversation records in the vector path.
    #[must_use]
    pub const fn with_conversations(mut self) -> Self {
        self.conversations = true;
        self
    }
}

/// Gathers scored candidates for one query from the lexical, vector, and
/// graph paths.
///
/// The vector path is silently skipped when no embedder or index was
/// configured; the graph predicate filter degrades to no filtering when the
/// collaborator misbehaves.
pub struct CandidateAggregator {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn TextGenerator>,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl CandidateAggregator {
    /// Creates an aggregator over the given collaborators.
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

    /// Gathers candidates from the selected paths.
    ///
    /// `entities` short-circuits graph entity resolution; when `None`, the
    /// collaborator resolves entities from the query text.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or entity resolution stays
    /// malformed after retries.
    pub async fn gather(
        &self,
        owner_id: &str,
        query: &str,
        entities: Option<&[String]>,
        sources: SourceSelector,
    ) -> Result<Vec<ScoredResult>> {
        let mut candidates = Vec::new();
        if sources.lexical {
            candidates.extend(self.lexical_candidates(owner_id, query).await?);
        }
        if sources.vector {
            candidates.extend(
                self.vector_candidates(owner_id, query, sources.conversations)
                    .await?,
            );
        }
        if sources.graph {
            candidates.extend(self.graph_candidates(owner_id, query, entities).await?);
        }
        tracing::debug!(
            owner_id,
            candidates = candidates.len(),
            "gathered recall candidates"
        );
        Ok(candidates)
    }

    /// Substring search over stored facts at a fixed raw score.
    async fn lexical_candidates(&self, owner_id: &str, query: &str) -> Result<Vec<ScoredResult>> {
        let facts = self.store.search_facts(owner_id, query).await?;
        Ok(facts
            .iter()
            .map(|fact| ScoredResult::lexical(fact, LEXICAL_SCORE))
            .collect())
    }

    /// Nearest-neighbor search over indexed records. Absent capability means
    /// an empty contribution, not an error. Conversation records only join
    /// when the selector asks for them.
    async fn vector_candidates(
        &self,
        owner_id: &str,
        query: &str,
        include_conversations: bool,
    ) -> Result<Vec<ScoredResult>> {
        let (Some(index), Some(embedder)) = (&self.index, &self.embedder) else {
            return Ok(Vec::new());
        };
        let embedding = embedder.embed(query).await?;
        let mut filter = VectorFilter::new().with_owner(owner_id);
        if !include_conversations {
            filter = filter.with_kind(RecordKind::Fact);
        }
        let hits = index.search(&embedding, VECTOR_TOP_K, &filter).await?;
        Ok(hits
            .into_iter()
            .map(|hit| ScoredResult {
                text: hit.text,
                score: hit.score,
                decayed_score: None,
                timestamp: hit.metadata.created_at,
                provenance: crate::models::Provenance::Vector,
                // Conversation hits carry a resource ID, not a fact ID, so
                // the ranker must not try to bump them.
                fact_id: (hit.metadata.kind == RecordKind::Fact).then(|| hit.id.into()),
                created_at: Some(hit.metadata.created_at),
                accessed_at: Some(hit.metadata.accessed_at),
            })
            .collect())
    }

    /// Graph traversal: resolve entities, load their active triplets (direct
    /// hits), expand one hop through objects, optionally filter predicates.
    async fn graph_candidates(
        &self,
        owner_id: &str,
        query: &str,
        entities: Option<&[String]>,
    ) -> Result<Vec<ScoredResult>> {
        let resolved: Vec<String> = match entities {
            Some(list) => list.to_vec(),
            None => llm::parse_json(&self.llm, &prompts::extract_entities(query)).await?,
        };

        let mut scored = self.traverse(owner_id, &resolved, Some(query)).await?;
        if scored.is_empty() && entities.is_none() {
            // Entity resolution found nothing in the graph; fall back to the
            // conventional root subject, unfiltered.
            scored = self
                .traverse(owner_id, &[DEFAULT_ENTITY.to_string()], None)
                .await?;
        }

        // Mixed-status ordering: current > uncertain > past, then raw score.
        scored.sort_by(|(a, sa), (b, sb)| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then(sb.partial_cmp(sa).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut seen = std::collections::HashSet::new();
        Ok(scored
            .into_iter()
            .filter(|(triplet, _)| seen.insert(triplet.label()))
            .map(|(triplet, score)| ScoredResult::graph(&triplet, score))
            .collect())
    }

    /// Loads active triplets for each entity plus one-hop expansions. A
    /// query enables predicate filtering; `None` keeps everything.
    async fn traverse(
        &self,
        owner_id: &str,
        entities: &[String],
        query: Option<&str>,
    ) -> Result<Vec<(Triplet, f32)>> {
        let predicate_filter = match query {
            Some(query) => self.predicate_filter(owner_id, entities, query).await?,
            None => None,
        };
        let keep = |predicate: &str| {
            predicate_filter
                .as_ref()
                .is_none_or(|allowed| allowed.contains(predicate))
        };

        let mut results = Vec::new();
        for entity in entities {
            let direct = self
                .store
                .active_triplets(owner_id, Some(entity.as_str()))
                .await?;
            for triplet in direct {
                if !keep(&triplet.predicate) {
                    continue;
                }
                let connected = self
                    .store
                    .active_triplets(owner_id, Some(triplet.object.as_str()))
                    .await?;
                results.push((triplet, GRAPH_DIRECT_SCORE));
                for hop in connected {
                    if keep(&hop.predicate) {
                        results.push((hop, GRAPH_HOP_SCORE));
                    }
                }
            }
        }
        Ok(results)
    }

    /// Asks the collaborator which predicates matter for this query.
    /// Any failure degrades to no filtering rather than dropping the path.
    async fn predicate_filter(
        &self,
        owner_id: &str,
        entities: &[String],
        query: &str,
    ) -> Result<Option<std::collections::HashSet<String>>> {
        let mut predicates = std::collections::BTreeSet::new();
        for entity in entities {
            for triplet in self
                .store
                .active_triplets(owner_id, Some(entity.as_str()))
                .await?
            {
                predicates.insert(triplet.predicate);
            }
        }
        if predicates.is_empty() {
            return Ok(None);
        }

        let listing = predicates
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        match llm::parse_json::<Vec<String>>(&self.llm, &prompts::filter_predicates(query, &listing))
            .await
        {
            Ok(keep) => {
                let filtered: std::collections::HashSet<String> = keep
                    .into_iter()
                    .filter(|p| predicates.contains(p))
                    .collect();
                if filtered.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(filtered))
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "predicate filter degraded to no filtering");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::{Fact, Provenance, TripletStatus};
    use crate::storage::{SqliteStore, SqliteVectorIndex, VectorMetadata};
    use std::sync::Mutex;

    struct ScriptedGenerator {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: &[&str]) -> Arc<dyn TextGenerator> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(ToString::to_string).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::op("complete", "script exhausted"))
        }
    }

    /// Collaborator whose every call fails, as a transport outage would.
    struct FailingGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for FailingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::op("complete", "transport down"))
        }
    }

    struct AxisEmbedder;

    #[async_trait::async_trait]
    impl Embedder for AxisEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // "python" leans on one axis, anything else on the other.
            if text.to_lowercase().contains("python") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    async fn store_with_facts() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_fact(&Fact::new("u1", "User prefers Python", "preferences"))
            .await
            .unwrap();
        store
            .save_fact(&Fact::new("u1", "User dislikes meetings", "work"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_lexical_path_fixed_score() {
        let store = store_with_facts().await;
        let llm = ScriptedGenerator::new(&[]);
        let aggregator = CandidateAggregator::new(store, llm, None, None);

        let lexical_only = SourceSelector {
            lexical: true,
            vector: false,
            graph: false,
            conversations: false,
        };
        let candidates = aggregator
            .gather("u1", "Python", None, lexical_only)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provenance, Provenance::Lexical);
        assert!((candidates[0].score - 0.8).abs() < f32::EPSILON);
        assert_eq!(candidates[0].text, "User prefers Python");
    }

    #[tokio::test]
    async fn test_vector_path_skipped_without_embedder() {
        let store = store_with_facts().await;
        let llm = ScriptedGenerator::new(&[]);
        let aggregator = CandidateAggregator::new(store, llm, None, None);

        let candidates = aggregator
            .gather("u1", "Python", None, SourceSelector::vector_only())
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_vector_path_filters_to_owner_facts() {
        let store = store_with_facts().await;
        let index = Arc::new(SqliteVectorIndex::open_in_memory().unwrap());
        let now = chrono::Utc::now();
        index
            .add(
                "f1",
                "User prefers Python",
                &[1.0, 0.0],
                VectorMetadata {
                    owner_id: "u1".to_string(),
                    kind: RecordKind::Fact,
                    category: Some("preferences".to_string()),
                    created_at: now,
                    accessed_at: now,
                },
            )
            .await
            .unwrap();
        index
            .add(
                "conv1",
                "raw conversation",
                &[1.0, 0.0],
                VectorMetadata {
                    owner_id: "u1".to_string(),
                    kind: RecordKind::Conversation,
                    category: None,
                    created_at: now,
                    accessed_at: now,
                },
            )
            .await
            .unwrap();

        let llm = ScriptedGenerator::new(&[]);
        let aggregator =
            CandidateAggregator::new(store, llm, Some(index), Some(Arc::new(AxisEmbedder)));
        let candidates = aggregator
            .gather("u1", "python stuff", None, SourceSelector::vector_only())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provenance, Provenance::Vector);
        assert_eq!(candidates[0].fact_id.as_ref().unwrap().as_str(), "f1");
    }

    #[tokio::test]
    async fn test_vector_path_includes_conversations_when_selected() {
        let store = store_with_facts().await;
        let index = Arc::new(SqliteVectorIndex::open_in_memory().unwrap());
        let now = chrono::Utc::now();
        index
            .add(
                "f1",
                "User prefers Python",
                &[1.0, 0.0],
                VectorMetadata {
                    owner_id: "u1".to_string(),
                    kind: RecordKind::Fact,
                    category: Some("preferences".to_string()),
                    created_at: now,
                    accessed_at: now,
                },
            )
            .await
            .unwrap();
        index
            .add(
                "conv1",
                "we discussed python tooling",
                &[1.0, 0.0],
                VectorMetadata {
                    owner_id: "u1".to_string(),
                    kind: RecordKind::Conversation,
                    category: None,
                    created_at: now,
                    accessed_at: now,
                },
            )
            .await
            .unwrap();

        let llm = ScriptedGenerator::new(&[]);
        let aggregator =
            CandidateAggregator::new(store, llm, Some(index), Some(Arc::new(AxisEmbedder)));
        let candidates = aggregator
            .gather(
                "u1",
                "python stuff",
                None,
                SourceSelector::vector_only().with_conversations(),
            )
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        let conversation = candidates
            .iter()
            .find(|c| c.text.contains("discussed"))
            .unwrap();
        // Conversation hits never carry a fact ID for the ranker to bump.
        assert!(conversation.fact_id.is_none());
    }

    #[tokio::test]
    async fn test_graph_direct_and_one_hop_scores() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "works_at", "Acme", TripletStatus::Current),
            )
            .await
            .unwrap();
        store
            .save_triplet(
                "u1",
                &Triplet::new("Acme", "located_in", "Berlin", TripletStatus::Current),
            )
            .await
            .unwrap();

        // An empty predicate selection means no filtering, so both the
        // direct hit and the hop survive.
        let llm = ScriptedGenerator::new(&[r"[]"]);
        let aggregator = CandidateAggregator::new(store, llm, None, None);
        let entities = vec!["User".to_string()];
        let candidates = aggregator
            .gather("u1", "where does the user work", Some(&entities), SourceSelector::graph_only())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        let direct = candidates
            .iter()
            .find(|c| c.text.starts_with("User works_at"))
            .unwrap();
        let hop = candidates
            .iter()
            .find(|c| c.text.starts_with("Acme located_in"))
            .unwrap();
        assert!((direct.score - 0.8).abs() < f32::EPSILON);
        assert!((hop.score - 0.6).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_graph_predicate_filter_degrades_on_malformed_output() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "works_at", "Acme", TripletStatus::Current),
            )
            .await
            .unwrap();

        // Three malformed responses exhaust the retry budget; the filter
        // must degrade to keeping every predicate.
        let llm = ScriptedGenerator::new(&["nope", "still nope", "not json"]);
        let aggregator = CandidateAggregator::new(store, llm, None, None);
        let entities = vec!["User".to_string()];
        let candidates = aggregator
            .gather("u1", "work?", Some(&entities), SourceSelector::graph_only())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.starts_with("User works_at Acme"));
    }

    #[tokio::test]
    async fn test_graph_predicate_filter_degrades_on_transport_failure() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "works_at", "Acme", TripletStatus::Current),
            )
            .await
            .unwrap();

        let aggregator =
            CandidateAggregator::new(store, Arc::new(FailingGenerator), None, None);
        let entities = vec!["User".to_string()];
        let candidates = aggregator
            .gather("u1", "work?", Some(&entities), SourceSelector::graph_only())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.starts_with("User works_at Acme"));
    }

    #[tokio::test]
    async fn test_default_entity_fallback_skips_predicate_filter() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "works_at", "Acme", TripletStatus::Current),
            )
            .await
            .unwrap();

        // One scripted response covers entity resolution only; the fallback
        // traversal through "User" must not spend another call on predicate
        // filtering, or the exhausted script would fail the gather.
        let llm = ScriptedGenerator::new(&[r#"["Nobody"]"#]);
        let aggregator = CandidateAggregator::new(store, llm, None, None);
        let candidates = aggregator
            .gather("u1", "where do I work?", None, SourceSelector::graph_only())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].text.starts_with("User works_at Acme"));
    }

    #[tokio::test]
    async fn test_graph_status_ordering() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "studied_at", "MIT", TripletStatus::Past),
            )
            .await
            .unwrap();
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "works_at", "Acme", TripletStatus::Current),
            )
            .await
            .unwrap();
        store
            .save_triplet(
                "u1",
                &Triplet::new("User", "lives_in", "Berlin", TripletStatus::Uncertain),
            )
            .await
            .unwrap();

        let llm = ScriptedGenerator::new(&[r#"["studied_at", "works_at", "lives_in"]"#]);
        let aggregator = CandidateAggregator::new(store, llm, None, None);
        let entities = vec!["User".to_string()];
        let candidates = aggregator
            .gather("u1", "about the user", Some(&entities), SourceSelector::graph_only())
            .await
            .unwrap();

        let order: Vec<&str> = candidates
            .iter()
            .map(|c| c.text.split(' ').nth(1).unwrap())
            .collect();
        assert_eq!(order, vec!["works_at", "lives_in", "studied_at"]);
    }
}
