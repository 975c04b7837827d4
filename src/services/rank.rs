//! Relevance ranking: decay, ordering, budget selection, context assembly.
//!
//! The ranking math is pure and synchronous; only the post-selection access
//! bump touches storage.

// Precision loss in the day/token arithmetic is acceptable here.
#![allow(clippy::cast_precision_loss)]

use crate::models::ScoredResult;
use crate::storage::RecordStore;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Sentinel opening the assembled context block.
pub const CONTEXT_HEADER: &str = "=== RELEVANT MEMORIES ===";
/// Sentinel closing the assembled context block.
pub const CONTEXT_FOOTER: &str = "=== END MEMORIES ===";

/// Estimated tokens for a piece of text: one token per four characters.
const CHARS_PER_TOKEN: usize = 4;

/// Ranker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct RankerConfig {
    /// Raw scores below this are excluded before decay.
    pub relevance_threshold: f32,
    /// Estimated-token budget for the assembled context.
    pub token_budget: usize,
    /// Age at which a decayed score halves, in days.
    pub half_life_days: f32,
    /// How far the blended timestamp leans toward last access, in [0, 1].
    pub access_weight: f32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.7,
            token_budget: 2000,
            half_life_days: 30.0,
            access_weight: 0.7,
        }
    }
}

/// Computes the decayed score for one candidate at `now`.
///
/// The effective timestamp blends creation toward last access by
/// `access_weight` (frequently recalled facts age more slowly), then the raw
/// score decays harmonically: `raw / (1 + age_days / half_life)`. A fact
/// exactly one half-life old scores half its raw value; decay never reaches
/// zero.
#[must_use]
pub fn decayed_score(
    raw: f32,
    created_at: DateTime<Utc>,
    accessed_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &RankerConfig,
) -> f32 {
    let weight = config.access_weight.clamp(0.0, 1.0);
    let accessed = accessed_at.max(created_at);
    let lived = (accessed - created_at).num_seconds() as f32;
    let blended_offset_secs = lived * weight;
    let age_secs = (now - created_at).num_seconds() as f32 - blended_offset_secs;
    let age_days = age_secs / 86_400.0;
    raw / (1.0 + age_days / config.half_life_days)
}

/// Decays, orders, and budget-selects candidates into a context block, then
/// bumps the access counter of each selected fact exactly once.
pub struct RelevanceRanker {
    store: Arc<dyn RecordStore>,
    config: RankerConfig,
}

impl RelevanceRanker {
    /// Creates a ranker with the given configuration.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, config: RankerConfig) -> Self {
        Self { store, config }
    }

    /// Ranks candidates and assembles the sentinel-bracketed context block.
    ///
    /// Steps: exclude raw scores below the threshold, decay the rest, sort
    /// by decayed score descending, accept greedily while the estimated
    /// token total stays within budget (no backtracking), bump each selected
    /// fact's access counter once, and format. An empty candidate set (or an
    /// empty selection) yields an empty string with no storage writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the access-bump writes fail.
    pub async fn select(&self, candidates: Vec<ScoredResult>) -> Result<String> {
        if candidates.is_empty() {
            return Ok(String::new());
        }
        let now = Utc::now();

        let mut scored: Vec<ScoredResult> = candidates
            .into_iter()
            .filter(|c| c.score >= self.config.relevance_threshold)
            .map(|mut c| {
                let created = c.created_at.unwrap_or(c.timestamp);
                let accessed = c.accessed_at.unwrap_or(c.timestamp);
                c.decayed_score = Some(decayed_score(c.score, created, accessed, now, &self.config));
                c
            })
            .collect();
        scored.sort_by(|a, b| {
            b.effective_score()
                .partial_cmp(&a.effective_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut selected: Vec<ScoredResult> = Vec::new();
        let mut used_tokens = 0;
        for candidate in scored {
            let tokens = candidate.text.len() / CHARS_PER_TOKEN;
            if used_tokens + tokens > self.config.token_budget {
                break;
            }
            used_tokens += tokens;
            selected.push(candidate);
        }

        self.bump_access(&selected, now).await?;
        Ok(format_context(&selected))
    }

    /// Increments the access counter of each distinct selected fact once.
    async fn bump_access(&self, selected: &[ScoredResult], now: DateTime<Utc>) -> Result<()> {
        let mut bumped = std::collections::HashSet::new();
        for result in selected {
            let Some(fact_id) = &result.fact_id else {
                continue;
            };
            if !bumped.insert(fact_id.clone()) {
                continue;
            }
            if let Some(mut fact) = self.store.get_fact(fact_id).await? {
                fact.record_access(now);
                self.store.update_fact(&fact).await?;
            }
        }
        Ok(())
    }
}

/// Formats selected results into the sentinel-bracketed context block, one
/// timestamp/confidence line and one text line per entry.
#[must_use]
pub fn format_context(selected: &[ScoredResult]) -> String {
    if selected.is_empty() {
        return String::new();
    }
    let mut lines = vec![format!("{CONTEXT_HEADER}\n")];
    for result in selected {
        lines.push(format!(
            "[{}] (confidence: {:.2})",
            result.timestamp.to_rfc3339(),
            result.effective_score()
        ));
        lines.push(format!("{}\n", result.text));
    }
    lines.push(CONTEXT_FOOTER.to_string());
    lines.join("\n")
}
