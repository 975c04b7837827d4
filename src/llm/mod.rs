//! Language-model collaborator abstraction.
//!
//! Provides the async [`TextGenerator`] capability interface plus the
//! response contracts built on top of it: JSON parsing with a bounded
//! re-prompt retry, and affirmative-token boolean judgments.

pub mod prompts;

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Extra attempts granted when a JSON response fails to parse.
const JSON_RETRY_BUDGET: u32 = 2;

/// Trait for text-generation collaborators.
///
/// Implementations wrap whatever backing model the host process provides.
/// Callers always await the returned future; there is no runtime branching
/// on whether the collaborator is awaitable.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Parses a JSON response from the collaborator, retrying on malformed output.
///
/// The prompt is sent once; each parse failure within the retry budget
/// re-prompts with the parse error and the invalid output attached.
/// Exhausting the budget surfaces [`Error::MalformedResponse`].
///
/// # Errors
///
/// Returns an error if the collaborator fails or the output never parses.
pub async fn parse_json<T: DeserializeOwned>(
    llm: &Arc<dyn TextGenerator>,
    prompt: &str,
) -> Result<T> {
    let mut raw = llm.complete(prompt).await?;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let cleaned = extract_json(&raw);
        match serde_json::from_str(cleaned) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempts > JSON_RETRY_BUDGET {
                    return Err(Error::MalformedResponse {
                        attempts,
                        cause: err.to_string(),
                    });
                }
                tracing::warn!(attempt = attempts, error = %err, "malformed JSON response, re-prompting");
                let retry_prompt = format!(
                    "Your previous response was invalid JSON.\n\
                     Error: {err}\n\
                     Expected JSON per the original instruction. \
                     Please output ONLY valid JSON and nothing else.\n\n\
                     Original instruction:\n{prompt}\n\n\
                     Invalid response:\n{raw}\n"
                );
                raw = llm.complete(&retry_prompt).await?;
            }
        }
    }
}

/// Boolean judgment contract: true iff the response contains an affirmative
/// token (`YES`, case-insensitive).
///
/// # Errors
///
/// Returns an error if the collaborator fails. The boolean itself cannot be
/// malformed; anything that does not affirm is `false`.
pub async fn parse_bool(llm: &Arc<dyn TextGenerator>, prompt: &str) -> Result<bool> {
    let raw = llm.complete(prompt).await?;
    Ok(raw.to_uppercase().contains("YES"))
}

/// Extracts JSON from a collaborator response, handling markdown code fences.
#[must_use]
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        // Skip language identifier if present (e.g., "json\n")
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find(['{', '['])
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Raw JSON: take whichever delimiter appears first, so an array of
    // objects is returned whole instead of truncated to its first element.
    let object_start = trimmed.find('{');
    let array_start = trimmed.find('[');
    let array_first = match (array_start, object_start) {
        (Some(a), Some(o)) => a < o,
        (Some(_), None) => true,
        _ => false,
    };
    if array_first {
        if let (Some(start), Some(end)) = (array_start, trimmed.rfind(']')) {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    } else if let (Some(start), Some(end)) = (object_start, trimmed.rfind('}')) {
        if end > start {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
