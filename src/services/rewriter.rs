use log::{info, warn};

use crate::services::{GenerationOptions, GenerationServiceTrait};

/// Result of a rewrite attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// The model produced a genuinely different standalone query
    Rewritten(String),
    /// The model echoed the original or returned nothing usable
    Unchanged,
}

/// LLM-assisted rewrite of a query into a standalone form using prior
/// conversation context. Only invoked when non-empty context exists and the
/// relevance gate (if enabled) passed.
#[derive(Debug, Clone, Default)]
pub struct QueryRewriter;

impl QueryRewriter {
    pub fn new() -> Self {
        Self
    }

    fn strip_wrapping_quotes(text: &str) -> &str {
        let trimmed = text.trim();
        let stripped = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
        stripped.unwrap_or(trimmed)
    }

    /// Rewrite `original_query` against `history_context`. Never substitutes
    /// an empty string: when the model echoes the original or returns
    /// nothing, the outcome is `Unchanged` and the caller keeps the original.
    pub async fn rewrite<G: GenerationServiceTrait>(
        &self,
        generation: &G,
        original_query: &str,
        history_context: &str,
    ) -> RewriteOutcome {
        let prompt = format!(
            "Given the conversation below, rewrite the user's latest question so it is fully \
             self-contained and understandable without the conversation. Reply with the rewritten \
             question only. If the question already stands alone, repeat it unchanged.\n\n\
             Conversation:\n{}\n\nLatest question: {}",
            history_context, original_query
        );

        match generation.generate(&prompt, &GenerationOptions::default()).await {
            Ok(output) => {
                let rewritten = Self::strip_wrapping_quotes(&output.content).to_string();
                if rewritten.is_empty() || rewritten == original_query.trim() {
                    RewriteOutcome::Unchanged
                } else {
                    info!("Query rewritten: '{}' -> '{}'", original_query, rewritten);
                    RewriteOutcome::Rewritten(rewritten)
                }
            }
            Err(e) => {
                warn!("Query rewrite failed, using original query: {}", e);
                RewriteOutcome::Unchanged
            }
        }
    }
}
