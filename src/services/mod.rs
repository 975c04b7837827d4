//! Engine services.
//!
//! Each service owns one stage of the memory lifecycle:
//!
//! - [`CaptureService`]: turns conversation text into stored facts,
//!   summaries, and relational triplets.
//! - [`CandidateAggregator`]: gathers scored candidates from the lexical,
//!   vector, and graph recall paths.
//! - [`RelevanceRanker`]: decays, orders, and budget-selects candidates into
//!   a context block.
//! - [`RecallService`]: the retrieve pipeline (query generation,
//!   summary-first recall, ranked escalation).
//! - [`ConflictResolver`]: supersession of contradicted relational facts.
//! - [`ConsolidationEngine`]: the three consolidation tiers.
//! - [`ShortTermMemory`]: conversational checkpoints.

pub mod aggregate;
pub mod capture;
pub mod checkpoint;
pub mod conflict;
pub mod consolidate;
pub mod rank;
pub mod recall;

pub use aggregate::{CandidateAggregator, SourceSelector};
pub use capture::{CaptureService, ExtractedFact, ExtractedTriplet, MemorizeOutcome, PreparedInput};
pub use checkpoint::ShortTermMemory;
pub use conflict::ConflictResolver;
pub use consolidate::{
    ConsolidationEngine, FrequentStats, InfrequentStats, MaintenanceReport, PeriodicStats,
};
pub use rank::{RankerConfig, RelevanceRanker};
pub use recall::{RecallOptions, RecallService};
