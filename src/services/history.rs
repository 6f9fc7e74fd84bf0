use anyhow::Result;
use log::{info, warn};

use crate::models::conversation::ConversationTurn;
use crate::models::response::{ERROR_ANSWER, NO_ANSWER_SENTINEL};
use crate::services::{GenerationOptions, GenerationServiceTrait};

/// Token-budgeted selection and summarization of prior conversation turns.
/// Token counts are estimated with a fixed characters-per-token ratio, not
/// an exact tokenizer.
#[derive(Debug, Clone)]
pub struct HistoryContextBuilder {
    chars_per_token: usize,
}

impl HistoryContextBuilder {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / self.chars_per_token
    }

    /// A turn is usable when it carries real content: not a generic
    /// "no answer"/error placeholder, and not blank on both sides
    fn is_usable(turn: &ConversationTurn) -> bool {
        let answer = turn.answer.final_answer.trim();
        if answer == NO_ANSWER_SENTINEL || answer == ERROR_ANSWER {
            return false;
        }
        !(turn.user_query.trim().is_empty() && answer.is_empty())
    }

    fn render_turn(turn: &ConversationTurn) -> String {
        format!(
            "User: {}\nAssistant: {}",
            turn.user_query.trim(),
            turn.answer.final_answer.trim()
        )
    }

    /// Walk history most-recent-first, accumulating turns until `max_turns`
    /// or the token budget is hit, then emit a single chronologically
    /// ordered block. Budget floor: if any usable turn exists, the most
    /// recent one is included even when it alone exceeds the budget.
    pub fn build_context(
        &self,
        history: &[ConversationTurn],
        max_turns: usize,
        max_token_budget: usize,
    ) -> String {
        let mut selected: Vec<String> = Vec::new();
        let mut used_tokens = 0usize;

        for turn in history.iter().rev() {
            if selected.len() >= max_turns {
                break;
            }
            if !Self::is_usable(turn) {
                continue;
            }

            let rendered = Self::render_turn(turn);
            let cost = self.estimate_tokens(&rendered);
            if used_tokens + cost > max_token_budget && !selected.is_empty() {
                break;
            }

            used_tokens += cost;
            selected.push(rendered);
        }

        // Selected most-recent-first; flip back to chronological order
        selected.reverse();
        selected.join("\n\n")
    }

    /// Compress the walked history window into a short summary via the
    /// generation service. Degrades to the plain truncation path on any
    /// generation failure.
    pub async fn summarize_history<G: GenerationServiceTrait>(
        &self,
        generation: &G,
        history: &[ConversationTurn],
        max_turns: usize,
        max_token_budget: usize,
    ) -> String {
        let context = self.build_context(history, max_turns, max_token_budget);
        if context.is_empty() {
            return context;
        }

        let prompt = format!(
            "Summarize the following conversation in at most 5 sentences, \
             keeping every fact a follow-up question might rely on:\n\n{}",
            context
        );

        match generation.generate(&prompt, &GenerationOptions::default()).await {
            Ok(output) if !output.content.trim().is_empty() => {
                info!("History summarized ({} -> {} chars)", context.len(), output.content.len());
                output.content.trim().to_string()
            }
            Ok(_) => {
                warn!("History summarization returned empty content, using truncated history");
                context
            }
            Err(e) => {
                warn!("History summarization failed, using truncated history: {}", e);
                context
            }
        }
    }

    /// Ask the generation service whether the built context is relevant to
    /// the query. Fails open: any non-yes/no answer, and any generation
    /// error, counts as relevant, since silently dropping context is worse
    /// than including slightly irrelevant context.
    pub async fn is_history_relevant<G: GenerationServiceTrait>(
        &self,
        generation: &G,
        query: &str,
        built_context: &str,
    ) -> Result<bool> {
        let prompt = format!(
            "Conversation so far:\n{}\n\nNew question: {}\n\n\
             Is the conversation above relevant to answering the new question? Answer yes or no.",
            built_context, query
        );

        let relevant = match generation.generate(&prompt, &GenerationOptions::default()).await {
            Ok(output) => {
                let verdict = output.content.trim().to_lowercase();
                if verdict.starts_with("no") {
                    false
                } else if verdict.starts_with("yes") {
                    true
                } else {
                    warn!("Relevance check returned non-yes/no answer, assuming relevant");
                    true
                }
            }
            Err(e) => {
                warn!("Relevance check failed, assuming relevant: {}", e);
                true
            }
        };

        Ok(relevant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::ConversationTurn;
    use crate::models::query::{Intent, QueryMetadata};
    use crate::models::response::AnsweredResult;
    use crate::services::GenerationOutput;
    use anyhow::anyhow;
    use std::collections::BTreeSet;

    struct FailingGeneration;

    #[async_trait::async_trait]
    impl GenerationServiceTrait for FailingGeneration {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationOutput> {
            Err(anyhow!("generation unavailable"))
        }
    }

    fn turn(query: &str, answer: &str) -> ConversationTurn {
        ConversationTurn::new(
            query.to_string(),
            AnsweredResult {
                final_answer: answer.to_string(),
                source_documents: Vec::new(),
                query_metadata: QueryMetadata {
                    original_query: query.to_string(),
                    rewritten_query: None,
                    intent: Intent::General,
                    count_type: None,
                    entity_types: BTreeSet::new(),
                },
                strategy_trace: Vec::new(),
                error: None,
            },
        )
    }

    #[test]
    fn orders_selected_turns_chronologically() {
        let builder = HistoryContextBuilder::new(4);
        let history = vec![turn("first?", "one"), turn("second?", "two")];
        let context = builder.build_context(&history, 5, 1000);
        let first = context.find("first?").unwrap();
        let second = context.find("second?").unwrap();
        assert!(first < second);
    }

    #[test]
    fn skips_placeholder_and_blank_turns() {
        let builder = HistoryContextBuilder::new(4);
        let history = vec![
            turn("real question?", "real answer"),
            turn("failed question?", NO_ANSWER_SENTINEL),
            turn("errored question?", ERROR_ANSWER),
            turn("", ""),
        ];
        let context = builder.build_context(&history, 5, 1000);
        assert!(context.contains("real question?"));
        assert!(!context.contains("failed question?"));
        assert!(!context.contains("errored question?"));
    }

    #[test]
    fn respects_max_turns() {
        let builder = HistoryContextBuilder::new(4);
        let history: Vec<_> = (0..10).map(|i| turn(&format!("q{}?", i), "a")).collect();
        let context = builder.build_context(&history, 2, 10_000);
        // Only the two most recent turns survive
        assert!(context.contains("q9?"));
        assert!(context.contains("q8?"));
        assert!(!context.contains("q7?"));
    }

    #[test]
    fn stops_at_token_budget() {
        let builder = HistoryContextBuilder::new(1);
        let history = vec![turn("old?", &"x".repeat(100)), turn("new?", &"y".repeat(100))];
        // Budget fits one turn but not two
        let context = builder.build_context(&history, 5, 150);
        assert!(context.contains("new?"));
        assert!(!context.contains("old?"));
    }

    #[test]
    fn budget_floor_keeps_most_recent_turn() {
        let builder = HistoryContextBuilder::new(1);
        let history = vec![turn("huge?", &"z".repeat(5000))];
        let context = builder.build_context(&history, 5, 10);
        assert!(context.contains("huge?"));
    }

    #[test]
    fn empty_history_yields_empty_context() {
        let builder = HistoryContextBuilder::new(4);
        assert!(builder.build_context(&[], 5, 1000).is_empty());
    }

    #[tokio::test]
    async fn summarization_failure_degrades_to_truncated_history() {
        let builder = HistoryContextBuilder::new(4);
        let history = vec![turn("first?", "one"), turn("second?", "two")];
        let summarized = builder
            .summarize_history(&FailingGeneration, &history, 5, 1000)
            .await;
        assert_eq!(summarized, builder.build_context(&history, 5, 1000));
        assert!(summarized.contains("first?"));
    }

    #[tokio::test]
    async fn relevance_check_failure_assumes_relevant() {
        let builder = HistoryContextBuilder::new(4);
        let relevant = builder
            .is_history_relevant(&FailingGeneration, "new question", "User: a\nAssistant: b")
            .await
            .unwrap();
        assert!(relevant);
    }
}
