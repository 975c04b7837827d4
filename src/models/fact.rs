//! Fact types and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(String);

impl FactId {
    /// Creates a new fact ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random fact ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An atomic, timestamped unit of recalled information tied to an owner
/// and category.
///
/// Facts are created on extraction, mutated on access (counter increment,
/// timestamp refresh) and on consolidation (content rewrite, archival), and
/// never physically deleted except when merged into another fact. Archived
/// facts are excluded from all active search paths but retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier.
    pub id: FactId,
    /// Owner this fact belongs to. No cross-owner leakage is permitted.
    pub owner_id: String,
    /// The fact content.
    pub content: String,
    /// Category label (e.g., "preferences", "work").
    pub category: String,
    /// Identifier of the conversational resource this fact was extracted from.
    pub source_id: String,
    /// Optional embedding vector.
    pub embedding: Option<Vec<f32>>,
    /// Number of times this fact has been selected by retrieval.
    pub access_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-accessed timestamp.
    pub accessed_at: DateTime<Utc>,
    /// Soft-delete flag. Archived facts stay out of active recall.
    pub archived: bool,
}

impl Fact {
    /// Creates a new fact with a generated ID and current timestamps.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FactId::generate(),
            owner_id: owner_id.into(),
            content: content.into(),
            category: category.into(),
            source_id: String::new(),
            embedding: None,
            access_count: 0,
            created_at: now,
            accessed_at: now,
            archived: false,
        }
    }

    /// Sets the originating resource reference.
    #[must_use]
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Sets the embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Records a retrieval access: bumps the counter and refreshes the
    /// last-accessed timestamp.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.accessed_at = now;
    }
}
