//! The retrieve pipeline: query generation, summary-first recall, and
//! escalation to ranked fact retrieval.

use crate::llm::{self, TextGenerator, prompts};
use crate::services::aggregate::{CandidateAggregator, SourceSelector};
use crate::services::rank::RelevanceRanker;
use crate::storage::RecordStore;
use crate::Result;
use std::sync::Arc;

/// Retrieval tuning for one call.
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    /// Explicit search query; skips collaborator query generation.
    pub search_query: Option<String>,
    /// Skip query generation and use the raw message as the query.
    pub skip_query_generation: bool,
    /// Skip the summary-first path and go straight to ranked retrieval.
    pub skip_summaries: bool,
    /// Pre-resolved graph entities; skips collaborator entity resolution.
    pub entities: Option<Vec<String>>,
    /// Which recall paths the ranked pipeline draws from.
    pub sources: Option<SourceSelector>,
}

/// Answers a query by first consulting category summaries and escalating to
/// the ranked fact pipeline when they do not suffice.
pub struct RecallService {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn TextGenerator>,
    aggregator: CandidateAggregator,
    ranker: RelevanceRanker,
}

impl RecallService {
    /// Creates a recall service over the given collaborators and pipeline
    /// stages.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        llm: Arc<dyn TextGenerator>,
        aggregator: CandidateAggregator,
        ranker: RelevanceRanker,
    ) -> Self {
        Self {
            store,
            llm,
            aggregator,
            ranker,
        }
    }

    /// Retrieves a context block for a user message.
    ///
    /// The message is rewritten into a search query (unless one is given),
    /// category summaries are consulted first, and the ranked fact pipeline
    /// runs when the summaries do not suffice. Missing data yields an empty
    /// string, never an error.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or a non-degradable collaborator
    /// contract stays malformed after retries.
    pub async fn retrieve(
        &self,
        owner_id: &str,
        message: &str,
        options: RecallOptions,
    ) -> Result<String> {
        let query = match &options.search_query {
            Some(explicit) => explicit.clone(),
            None if options.skip_query_generation => message.to_string(),
            None => self.generate_query(message).await,
        };

        let mut summaries_block = String::new();
        if !options.skip_summaries {
            let summaries = self.relevant_summaries(owner_id, message).await?;
            if !summaries.is_empty() {
                summaries_block = format_summaries(&summaries);
                if self.sufficient(message, &summaries).await {
                    tracing::debug!(owner_id, "summaries sufficed, skipping ranked retrieval");
                    return Ok(summaries_block);
                }
            }
        }

        let candidates = self
            .aggregator
            .gather(
                owner_id,
                &query,
                options.entities.as_deref(),
                options.sources.unwrap_or_default(),
            )
            .await?;
        let ranked = self.ranker.select(candidates).await?;

        let parts: Vec<&str> = [summaries_block.as_str(), ranked.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        Ok(parts.join("\n\n"))
    }

    /// Rewrites the raw message into a search query. Collaborator failure
    /// degrades to the message itself.
    async fn generate_query(&self, message: &str) -> String {
        match self.llm.complete(&prompts::generate_query(message)).await {
            Ok(query) if !query.trim().is_empty() => query.trim().to_string(),
            Ok(_) => message.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "query generation degraded to raw message");
                message.to_string()
            }
        }
    }

    /// Loads the general summaries of the categories relevant to the query.
    /// Category selection degrades to all categories on collaborator failure.
    async fn relevant_summaries(
        &self,
        owner_id: &str,
        message: &str,
    ) -> Result<Vec<(String, String)>> {
        let all = self.store.list_categories(owner_id).await?;
        if all.is_empty() {
            return Ok(Vec::new());
        }

        let listing = all.join(", ");
        let mut relevant = match llm::parse_json::<Vec<String>>(
            &self.llm,
            &prompts::select_categories(message, &listing),
        )
        .await
        {
            Ok(selected) => selected
                .into_iter()
                .filter(|c| all.contains(c))
                .collect::<Vec<_>>(),
            Err(err) => {
                tracing::warn!(error = %err, "category selection degraded to all categories");
                Vec::new()
            }
        };
        if relevant.is_empty() {
            relevant = all;
        }

        let mut summaries = Vec::new();
        for category in relevant {
            if let Some(summary) = self.store.load_general_summary(owner_id, &category).await? {
                summaries.push((category, summary));
            }
        }
        Ok(summaries)
    }

    /// Asks whether the summaries answer the query. Collaborator failure
    /// degrades to "insufficient" so retrieval escalates rather than
    /// answering from thin air.
    async fn sufficient(&self, message: &str, summaries: &[(String, String)]) -> bool {
        let text = summaries
            .iter()
            .map(|(category, summary)| format!("### {category}\n{summary}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        match llm::parse_bool(&self.llm, &prompts::sufficiency_check(message, &text)).await {
            Ok(sufficient) => sufficient,
            Err(err) => {
                tracing::warn!(error = %err, "sufficiency check degraded to insufficient");
                false
            }
        }
    }
}

/// Formats category summaries as markdown sections.
fn format_summaries(summaries: &[(String, String)]) -> String {
    summaries
        .iter()
        .map(|(category, summary)| format!("## {category}\n{}", summary.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::Fact;
    use crate::services::rank::RankerConfig;
    use crate::storage::SqliteStore;
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

    fn service(store: &Arc<SqliteStore>, llm: &Arc<dyn TextGenerator>) -> RecallService {
        let store_dyn: Arc<dyn RecordStore> = store.clone();
        let aggregator = CandidateAggregator::new(store_dyn.clone(), llm.clone(), None, None);
        let ranker = RelevanceRanker::new(store_dyn.clone(), RankerConfig::default());
        RecallService::new(store_dyn, llm.clone(), aggregator, ranker)
    }

    fn lexical_only() -> RecallOptions {
        RecallOptions {
            skip_query_generation: true,
            skip_summaries: true,
            sources: Some(SourceSelector {
                lexical: true,
                vector: false,
                graph: false,
                conversations: false,
            }),
            ..RecallOptions::default()
        }
    }

    #[tokio::test]
    async fn test_missing_data_returns_empty_context() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let llm = ScriptedGenerator::new(&[]);
        let recall = service(&store, &llm);

        let context = recall
            .retrieve("u1", "anything stored?", lexical_only())
            .await
            .unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_sufficient_summaries_short_circuit() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_general_summary("u1", "work", "Works at Acme on infra.")
            .await
            .unwrap();
        // Script: query generation, category selection, sufficiency YES.
        let llm = ScriptedGenerator::new(&["user workplace", r#"["work"]"#, "YES"]);
        let recall = service(&store, &llm);

        let context = recall
            .retrieve("u1", "Where do I work?", RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(context, "## work\nWorks at Acme on infra.");
    }

    #[tokio::test]
    async fn test_insufficient_summaries_escalate_to_ranked() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_general_summary("u1", "preferences", "Likes terse answers.")
            .await
            .unwrap();
        store
            .save_fact(&Fact::new("u1", "User prefers Python", "preferences"))
            .await
            .unwrap();
        // Script: category selection, sufficiency NO.
        let llm = ScriptedGenerator::new(&[r#"["preferences"]"#, "NO"]);
        let recall = service(&store, &llm);

        let options = RecallOptions {
            search_query: Some("Python".to_string()),
            sources: Some(SourceSelector {
                lexical: true,
                vector: false,
                graph: false,
                conversations: false,
            }),
            ..RecallOptions::default()
        };
        let context = recall
            .retrieve("u1", "What language do I prefer?", options)
            .await
            .unwrap();
        assert!(context.contains("## preferences"));
        assert!(context.contains("=== RELEVANT MEMORIES ==="));
        assert!(context.contains("User prefers Python"));
    }

    #[tokio::test]
    async fn test_category_selection_degrades_to_all() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_general_summary("u1", "work", "Works at Acme.")
            .await
            .unwrap();
        // Category selection malformed three times, then sufficiency YES.
        let llm = ScriptedGenerator::new(&["??", "??", "??", "YES"]);
        let recall = service(&store, &llm);

        let options = RecallOptions {
            search_query: Some("work".to_string()),
            ..RecallOptions::default()
        };
        let context = recall.retrieve("u1", "my job?", options).await.unwrap();
        assert_eq!(context, "## work\nWorks at Acme.");
    }

    #[tokio::test]
    async fn test_collaborator_outage_still_yields_stored_context() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_general_summary("u1", "work", "Works at Acme.")
            .await
            .unwrap();
        store
            .save_fact(&Fact::new("u1", "User prefers Python", "preferences"))
            .await
            .unwrap();
        // Every collaborator call fails: category selection degrades to all
        // categories, the sufficiency check degrades to insufficient, and
        // the lexical path still surfaces the stored fact.
        let llm: Arc<dyn TextGenerator> = Arc::new(FailingGenerator);
        let recall = service(&store, &llm);

        let options = RecallOptions {
            search_query: Some("Python".to_string()),
            sources: Some(SourceSelector {
                lexical: true,
                vector: false,
                graph: false,
                conversations: false,
            }),
            ..RecallOptions::default()
        };
        let context = recall
            .retrieve("u1", "What language do I prefer?", options)
            .await
            .unwrap();
        assert!(context.contains("## work"));
        assert!(context.contains("User prefers Python"));
    }

    #[tokio::test]
    async fn test_query_generation_degrades_to_message() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .save_fact(&Fact::new("u1", "User prefers Python", "preferences"))
            .await
            .unwrap();
        // Empty script: the single query-generation call fails, and the raw
        // message still matches lexically.
        let llm = ScriptedGenerator::new(&[]);
        let recall = service(&store, &llm);

        let options = RecallOptions {
            skip_summaries: true,
            sources: Some(SourceSelector {
                lexical: true,
                vector: false,
                graph: false,
                conversations: false,
            }),
            ..RecallOptions::default()
        };
        let context = recall.retrieve("u1", "Python", options).await.unwrap();
        assert!(context.contains("User prefers Python"));
    }
}
