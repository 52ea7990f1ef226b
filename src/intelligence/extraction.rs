//! Extraction response parsing for intelligence items.
//!
//! Parses JSON responses from the LLM extraction prompt into
//! [`ExtractionResult`] values. Handles malformed or partial JSON gracefully.

use crate::intelligence::types::ExtractionResult;
use tracing::warn;

/// Parse an extraction response from the LLM.
///
/// Accepts raw text (which may contain markdown fences or extra whitespace)
/// and attempts to deserialize it into an [`ExtractionResult`].
///
/// Returns an empty result on failure rather than an error, since extraction
/// is best-effort and should never block the conversation pipeline.
#[must_use]
pub fn parse_extraction_response(raw: &str) -> ExtractionResult {
    let json_str = extract_json_block(raw);

    match serde_json::from_str::<ExtractionResult>(json_str) {
        Ok(mut result) => {
            // Clamp item count and validate.
            result.items.retain(|item| item.is_valid());
            if result.items.len() > MAX_ITEMS {
                result.items.truncate(MAX_ITEMS);
            }
            result
        }
        Err(e) => {
            if !json_str.trim().is_empty() {
                warn!("intelligence extraction parse failed: {e}");
            }
            ExtractionResult::default()
        }
    }
}

/// Maximum items to keep from a single extraction pass.
const MAX_ITEMS: usize = 10;

/// Extract the JSON body from a potentially markdown-fenced response.
fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();

    // Check for ```json ... ``` fences.
    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    // Check for ``` ... ``` fences (no language tag).
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    // Try to find JSON object boundaries.
    if let Some(start) = trimmed.find('{')
        && let Some(end) = trimmed.rfind('}')
        && end > start
    {
        return &trimmed[start..=end];
    }

    trimmed
}
