//! Ephemeral scored results produced per query.

use super::{FactId, Triplet};
use chrono::{DateTime, Utc};
use std::fmt;

/// Which recall path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Keyword/substring match against stored fact content.
    Lexical,
    /// Nearest-neighbor match from the vector index.
    Vector,
    /// Relational-graph traversal.
    Graph,
}

impl Provenance {
    /// Returns the provenance as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
            Self::Graph => "graph",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate produced for one query. Never persisted.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    /// Text to surface if selected.
    pub text: String,
    /// Raw relevance score from the producing path.
    pub score: f32,
    /// Decayed score, populated by the ranker.
    pub decayed_score: Option<f32>,
    /// Display timestamp (creation time when known).
    pub timestamp: DateTime<Utc>,
    /// Which recall path produced this result.
    pub provenance: Provenance,
    /// Back-reference to the originating fact, when one exists.
    pub fact_id: Option<FactId>,
    /// Creation timestamp of the underlying record, when known.
    pub created_at: Option<DateTime<Utc>>,
    /// Last-accessed timestamp of the underlying record, when known.
    pub accessed_at: Option<DateTime<Utc>>,
}

impl ScoredResult {
    /// Builds a lexical result from a stored fact at a fixed raw score.
    #[must_use]
    pub fn lexical(fact: &super::Fact, score: f32) -> Self {
        Self {
            text: fact.content.clone(),
            score,
            decayed_score: None,
            timestamp: fact.created_at,
            provenance: Provenance::Lexical,
            fact_id: Some(fact.id.clone()),
            created_at: Some(fact.created_at),
            accessed_at: Some(fact.accessed_at),
        }
    }

    /// Builds a graph result from a triplet at a fixed base score
    /// (0.8 direct hit, 0.6 one-hop expansion).
    #[must_use]
    pub fn graph(triplet: &Triplet, score: f32) -> Self {
        Self {
            text: triplet.label(),
            score,
            decayed_score: None,
            timestamp: triplet.timestamp,
            provenance: Provenance::Graph,
            fact_id: None,
            created_at: Some(triplet.timestamp),
            accessed_at: None,
        }
    }

    /// The score retrieval should order by: decayed when computed, raw otherwise.
    #[must_use]
    pub fn effective_score(&self) -> f32 {
        self.decayed_score.unwrap_or(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fact, TripletStatus};

    #[test]
    fn test_lexical_carries_fact_backref() {
        let fact = Fact::new("u1", "User prefers Python", "preferences");
        let result = ScoredResult::lexical(&fact, 0.8);
        assert_eq!(result.fact_id.as_ref(), Some(&fact.id));
        assert_eq!(result.provenance, Provenance::Lexical);
        assert!((result.score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_graph_label_and_no_backref() {
        let t = Triplet::new("User", "works_at", "Acme", TripletStatus::Current);
        let result = ScoredResult::graph(&t, 0.6);
        assert_eq!(result.text, "User works_at Acme (current)");
        assert!(result.fact_id.is_none());
    }

    #[test]
    fn test_effective_score_prefers_decayed() {
        let fact = Fact::new("u1", "content", "general");
        let mut result = ScoredResult::lexical(&fact, 0.8);
        assert!((result.effective_score() - 0.8).abs() < f32::EPSILON);
        result.decayed_score = Some(0.4);
        assert!((result.effective_score() - 0.4).abs() < f32::EPSILON);
    }
}
