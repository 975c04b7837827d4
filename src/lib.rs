//! # Recollect
//!
//! Long-term memory engine for AI agents.
//!
//! Recollect records discrete facts extracted from conversation and later
//! answers a query by assembling the most relevant, least stale facts within
//! a token budget. Candidates are gathered from three recall paths (keyword,
//! vector similarity, relational graph), scored with a combined
//! relevance/recency/access model, and periodically consolidated so the
//! corpus does not grow unbounded or go stale.
//!
//! The storage engine, vector index internals, and language-model transport
//! are external collaborators behind narrow async traits ([`RecordStore`],
//! [`VectorIndex`], [`TextGenerator`], [`Embedder`]); reference SQLite-backed
//! implementations are included.
//!
//! ## Example
//!
//! ```rust,ignore
//! use recollect::Memory;
//!
//! let memory = Memory::new("u1", store, llm)
//!     .with_vector_index(index, embedder);
//! memory.memorize("I switched to the Rust team last month").await?;
//! let context = memory.retrieve("What team am I on?").await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod embedding;
pub mod llm;
pub mod memory;
pub mod models;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use embedding::Embedder;
pub use llm::TextGenerator;
pub use memory::Memory;
pub use models::{Checkpoint, Fact, FactId, Provenance, ScoredResult, Triplet, TripletStatus};
pub use services::{
    CandidateAggregator, CaptureService, ConflictResolver, ConsolidationEngine, RankerConfig,
    RecallService, RelevanceRanker, ShortTermMemory, SourceSelector,
};
pub use storage::{RecordStore, SqliteStore, SqliteVectorIndex, VectorIndex};

/// Error type for recollect operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Missing required parameters, empty content, unusable configuration |
/// | `OperationFailed` | Database queries fail, collaborator calls fail, I/O errors |
/// | `MalformedResponse` | Collaborator output stays unparseable after bounded retries |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Required parameters are missing (e.g., empty content in memorize)
    /// - A capability required by the requested path is absent and cannot
    ///   be degraded around (e.g., graph capture without an embedder)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations fail
    /// - A collaborator (storage, vector index, LLM, embedder) returns an error
    /// - Serialization of a stored payload fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A collaborator response stayed malformed after bounded retries.
    ///
    /// Raised by the JSON response contract in [`llm`] once the re-prompt
    /// budget is exhausted. Carries the total number of attempts made and
    /// the final parse error.
    #[error("malformed collaborator response after {attempts} attempts: {cause}")]
    MalformedResponse {
        /// Total attempts made, including the initial one.
        attempts: u32,
        /// The final parse error.
        cause: String,
    },
}

/// Result type alias for recollect operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds an `OperationFailed` error for `operation` from any displayable cause.
    pub fn op(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}
