//! Conversational checkpoints for short-term rewind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the append-only checkpoint log, keyed by (thread, step).
///
/// Checkpoints back short-term conversational rewind. They share the record
/// store with the ranking core but are not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Owning conversation thread.
    pub thread_id: String,
    /// Step identifier within the thread.
    pub step_id: String,
    /// Arbitrary state payload.
    pub state: serde_json::Value,
    /// When the checkpoint was taken.
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a checkpoint timestamped now.
    #[must_use]
    pub fn new(
        thread_id: impl Into<String>,
        step_id: impl Into<String>,
        state: serde_json::Value,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step_id: step_id.into(),
            state,
            timestamp: Utc::now(),
        }
    }
}
