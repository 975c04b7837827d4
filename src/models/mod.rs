//! Data models for recollect.
//!
//! This module contains all the core data structures used throughout the engine.

mod checkpoint;
mod fact;
mod scored;
mod triplet;

pub use checkpoint::Checkpoint;
pub use fact::{Fact, FactId};
pub use scored::{Provenance, ScoredResult};
pub use triplet::{Triplet, TripletStatus};
