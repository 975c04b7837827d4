//! Supersession of contradicted relational facts.

use crate::llm::{self, TextGenerator, prompts};
use crate::models::{Triplet, TripletStatus};
use crate::storage::RecordStore;
use crate::Result;
use std::sync::Arc;

/// Routes incoming triplets through the conflict judgment and commits them.
///
/// A new `current` triplet may supersede existing active rows for the same
/// (owner, subject, predicate): when the collaborator judges the values
/// mutually exclusive, the old rows are retired to inactive/`past_replaced`.
/// The new triplet is always appended, whatever the judgment. Triplets
/// arriving as `past` or `uncertain` never trigger a judgment.
pub struct ConflictResolver {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn TextGenerator>,
}

impl ConflictResolver {
    /// Creates a resolver over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, llm: Arc<dyn TextGenerator>) -> Self {
        Self { store, llm }
    }

    /// Commits a triplet, retiring superseded rows first. Returns how many
    /// rows were retired.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or the conflict judgment fails. A failed
    /// judgment leaves existing rows untouched and the new triplet unsaved,
    /// so the graph never loses information to a transport hiccup.
    pub async fn commit(&self, owner_id: &str, triplet: &Triplet) -> Result<usize> {
        let mut retired = 0;
        if triplet.status == TripletStatus::Current {
            let existing = self
                .store
                .active_triplets(owner_id, Some(triplet.subject.as_str()))
                .await?;
            let same_predicate: Vec<&Triplet> = existing
                .iter()
                .filter(|t| t.predicate == triplet.predicate)
                .collect();
            if !same_predicate.is_empty() && self.conflicts(triplet, &same_predicate).await? {
                retired = self
                    .store
                    .deactivate_triplets(owner_id, &triplet.subject, &triplet.predicate)
                    .await?;
                tracing::debug!(
                    owner_id,
                    subject = %triplet.subject,
                    predicate = %triplet.predicate,
                    retired,
                    "superseded relational facts"
                );
            }
        }
        self.store.save_triplet(owner_id, triplet).await?;
        Ok(retired)
    }

    async fn conflicts(&self, new: &Triplet, existing: &[&Triplet]) -> Result<bool> {
        let listing = existing
            .iter()
            .map(|t| format!("- {} {} {}", t.subject, t.predicate, t.object))
            .collect::<Vec<_>>()
            .join("\n");
        llm::parse_bool(
            &self.llm,
            &prompts::detect_conflict(&new.subject, &new.predicate, &new.object, &listing),
        )
        .await
    }
}
