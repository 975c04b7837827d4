//! Relational triplet types and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a relational triplet.
///
/// `PastReplaced` is terminal for a given row: a row only moves there via
/// supersession and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripletStatus {
    /// The fact holds now.
    #[default]
    Current,
    /// The fact held in the past (stated as past by the source).
    Past,
    /// Temporal validity is unclear.
    Uncertain,
    /// Retired by a newer conflicting fact.
    PastReplaced,
}

impl TripletStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Past => "past",
            Self::Uncertain => "uncertain",
            Self::PastReplaced => "past_replaced",
        }
    }

    /// Parses a status string. Unknown values fall back to `Uncertain`
    /// rather than failing, since extraction output is untrusted.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Self::Current,
            "past" => Self::Past,
            "past_replaced" => Self::PastReplaced,
            _ => Self::Uncertain,
        }
    }

    /// Ordering key for mixed-status graph results:
    /// `current` > `uncertain` > `past`/`past_replaced`.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Current => 0,
            Self::Uncertain => 1,
            Self::Past | Self::PastReplaced => 2,
        }
    }
}

impl fmt::Display for TripletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subject–predicate–object relational fact with a lifecycle status.
///
/// At most one *active* triplet per (subject, predicate) is expected in the
/// `current` steady state; the conflict resolver enforces this by
/// supersession, not by a uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triplet {
    /// The subject entity.
    pub subject: String,
    /// The relation name.
    pub predicate: String,
    /// The object entity or value.
    pub object: String,
    /// When the triplet was recorded.
    pub timestamp: DateTime<Utc>,
    /// Whether the triplet participates in active recall.
    pub active: bool,
    /// Lifecycle status.
    pub status: TripletStatus,
}

impl Triplet {
    /// Creates a new active triplet recorded now.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        status: TripletStatus,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            timestamp: Utc::now(),
            active: true,
            status,
        }
    }

    /// Synthesized text label embedding the status tag,
    /// e.g. `"Alice works_at Acme (current)"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} {} {} ({})",
            self.subject, self.predicate, self.object, self.status
        )
    }
}
