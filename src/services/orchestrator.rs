use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::conversation::ConversationTurn;
use crate::models::query::{Intent, QueryAnalysis, QueryMetadata};
use crate::models::response::{
    AnsweredResult, OrchestratedResponse, OrchestrationOptions, RetrievedDocument, StrategyOutcome,
    TraceRecord, TraceStage, ERROR_ANSWER, NO_ANSWER_SENTINEL,
};
use crate::services::entities::has_financial_entities;
use crate::services::{
    AggregationServiceTrait, AnalyticalServiceTrait, ConversationStore, GenerationOptions,
    GenerationServiceTrait, HistoryContextBuilder, IntentClassifier, KeywordIntentClassifier,
    QueryAnalyzer, QueryRewriter, RetrievalServiceTrait, ALL_SOURCES_ID,
};

/// Query vocabulary that routes an `analysis` intent to the code-execution path
const CODE_VOCABULARY: &[&str] = &[
    "code", "python", "script", "program", "compute", "calculate", "simulation", "regression",
];

/// What the pipeline produced before persistence
struct PipelineOutput {
    final_answer: String,
    source_documents: Vec<RetrievedDocument>,
    metadata: QueryMetadata,
    error: Option<String>,
}

/// The strategy router and orchestrator: decides how to answer one query,
/// guarantees a non-empty answer, and persists every turn.
///
/// Generic over the four independently fallible collaborators so tests can
/// substitute mocks for any of them.
#[derive(Clone)]
pub struct QueryOrchestrator<R, A, C, G>
where
    R: RetrievalServiceTrait + Clone,
    A: AggregationServiceTrait + Clone,
    C: AnalyticalServiceTrait + Clone,
    G: GenerationServiceTrait + Clone,
{
    config: Config,
    store: ConversationStore,
    analyzer: QueryAnalyzer,
    classifier: Arc<dyn IntentClassifier>,
    history_builder: HistoryContextBuilder,
    rewriter: QueryRewriter,
    retrieval: R,
    aggregation: A,
    analytical: C,
    generation: G,
}

impl<R, A, C, G> QueryOrchestrator<R, A, C, G>
where
    R: RetrievalServiceTrait + Clone,
    A: AggregationServiceTrait + Clone,
    C: AnalyticalServiceTrait + Clone,
    G: GenerationServiceTrait + Clone,
{
    pub fn new(config: Config, retrieval: R, aggregation: A, analytical: C, generation: G) -> Self {
        let history_builder = HistoryContextBuilder::new(config.chars_per_token);
        Self {
            config,
            store: ConversationStore::new(),
            analyzer: QueryAnalyzer::new(),
            classifier: Arc::new(KeywordIntentClassifier::new()),
            history_builder,
            rewriter: QueryRewriter::new(),
            retrieval,
            aggregation,
            analytical,
            generation,
        }
    }

    /// Swap the heuristic classifier for another implementation
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Process one user query end to end. Never returns an error and never
    /// panics: any failure degrades into a neutral answer with the `error`
    /// field populated, and the turn is persisted regardless of outcome.
    pub async fn process_user_query(
        &self,
        query: &str,
        options: &OrchestrationOptions,
    ) -> OrchestratedResponse {
        let conversation_id = options
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut trace: Vec<TraceRecord> = Vec::new();

        info!("Processing query for conversation {}: {}", conversation_id, query);

        let output = match self
            .run_pipeline(query, options, &conversation_id, &mut trace)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                error!("Unexpected error while processing query: {:#}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Strategy,
                    format!("unexpected error: {}", e),
                ));
                PipelineOutput {
                    final_answer: ERROR_ANSWER.to_string(),
                    source_documents: Vec::new(),
                    metadata: QueryMetadata {
                        original_query: query.to_string(),
                        rewritten_query: None,
                        intent: Intent::General,
                        count_type: None,
                        entity_types: Default::default(),
                    },
                    error: Some(e.to_string()),
                }
            }
        };

        // The turn is written even when processing failed; a persistence
        // failure is logged but never changes the returned response
        let answered = AnsweredResult {
            final_answer: output.final_answer.clone(),
            source_documents: output.source_documents.clone(),
            query_metadata: output.metadata.clone(),
            strategy_trace: trace.clone(),
            error: output.error.clone(),
        };
        match self.store.update_state(
            &conversation_id,
            ConversationTurn::new(query.to_string(), answered),
            options.user_id.as_deref(),
        ) {
            Ok(state) => {
                trace.push(TraceRecord::new(
                    TraceStage::Persistence,
                    format!("turn appended ({} turns total)", state.history.len()),
                ));
            }
            Err(e) => {
                error!("Failed to persist conversation turn: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Persistence,
                    format!("append failed: {}", e),
                ));
            }
        }

        OrchestratedResponse {
            final_answer: output.final_answer,
            source_documents: output.source_documents,
            query_metadata: output.metadata,
            strategy_trace: trace.iter().map(|r| r.render()).collect(),
            conversation_id,
            error: output.error,
        }
    }

    async fn run_pipeline(
        &self,
        query: &str,
        options: &OrchestrationOptions,
        conversation_id: &str,
        trace: &mut Vec<TraceRecord>,
    ) -> Result<PipelineOutput> {
        // Analysis and intent classification are pure functions of the text
        let mut analysis = self.analyzer.analyze(query, self.classifier.as_ref());
        trace.push(TraceRecord::new(
            TraceStage::Analysis,
            format!(
                "intent={}, complexity={:?}, analytical={}, full_dataset={}",
                analysis.intent.as_str(),
                analysis.complexity,
                analysis.is_analytical,
                analysis.requires_full_dataset
            ),
        ));

        let history_context = self
            .resolve_history(query, options, conversation_id, trace)
            .await;

        // Rewrite only with usable, relevant context
        let mut effective_query = query.to_string();
        let mut rewritten_query = None;
        if options.enable_query_rewriting && !history_context.is_empty() {
            match self
                .rewriter
                .rewrite(&self.generation, query, &history_context)
                .await
            {
                crate::services::rewriter::RewriteOutcome::Rewritten(rewritten) => {
                    trace.push(TraceRecord::new(
                        TraceStage::Rewrite,
                        format!("query rewritten to: {}", rewritten),
                    ));
                    // Intent and entities are re-derived from the standalone form
                    analysis = self.analyzer.analyze(&rewritten, self.classifier.as_ref());
                    trace.push(TraceRecord::new(
                        TraceStage::Analysis,
                        format!("re-analyzed: intent={}", analysis.intent.as_str()),
                    ));
                    effective_query = rewritten.clone();
                    rewritten_query = Some(rewritten);
                }
                crate::services::rewriter::RewriteOutcome::Unchanged => {
                    trace.push(TraceRecord::new(TraceStage::Rewrite, "kept original query"));
                }
            }
        }

        let count_type = if analysis.intent == Intent::Count {
            self.classifier.count_type(&effective_query.to_lowercase())
        } else {
            None
        };
        let metadata = QueryMetadata {
            original_query: query.to_string(),
            rewritten_query,
            intent: analysis.intent,
            count_type,
            entity_types: analysis.entity_types.clone(),
        };

        let outcome = self
            .dispatch(&effective_query, &analysis, options, conversation_id, &history_context, trace)
            .await;

        let source_documents = match &outcome {
            StrategyOutcome::Retrieval { documents, .. } => documents.clone(),
            StrategyOutcome::Aggregation { rows, .. } => rows
                .iter()
                .enumerate()
                .map(|(i, row)| RetrievedDocument {
                    id: format!("aggregation-{}", i),
                    content: row.to_string(),
                    score: 1.0,
                    metadata: Default::default(),
                })
                .collect(),
            StrategyOutcome::Analytical { .. } | StrategyOutcome::Unhandled => Vec::new(),
        };

        let preliminary = outcome.answer().to_string();
        let needs_guarantee =
            preliminary.trim().is_empty() || preliminary == NO_ANSWER_SENTINEL;

        if !needs_guarantee {
            return Ok(PipelineOutput {
                final_answer: preliminary,
                source_documents,
                metadata,
                error: None,
            });
        }

        if !options.generate_final_answer {
            trace.push(TraceRecord::new(
                TraceStage::Generation,
                "final-answer generation disabled, returning sentinel",
            ));
            return Ok(PipelineOutput {
                final_answer: NO_ANSWER_SENTINEL.to_string(),
                source_documents,
                metadata,
                error: None,
            });
        }

        // Final-answer guarantee: one more generation call from whatever
        // partial material exists
        let (final_answer, err) = self
            .final_guarantee(&effective_query, &analysis, options, &preliminary, &source_documents, &history_context, trace)
            .await;

        Ok(PipelineOutput {
            final_answer,
            source_documents,
            metadata,
            error: err,
        })
    }

    /// Read conversation state and build (optionally summarized, optionally
    /// relevance-gated) history context. Errors degrade to empty context.
    async fn resolve_history(
        &self,
        query: &str,
        options: &OrchestrationOptions,
        conversation_id: &str,
        trace: &mut Vec<TraceRecord>,
    ) -> String {
        let use_history = options.force_use_history.unwrap_or(options.use_history);
        if !use_history {
            trace.push(TraceRecord::new(TraceStage::History, "history disabled"));
            return String::new();
        }

        let state = match self.store.get_state(conversation_id) {
            Ok(Some(state)) => state,
            Ok(None) => {
                trace.push(TraceRecord::new(TraceStage::History, "no prior history"));
                return String::new();
            }
            Err(e) => {
                warn!("Failed to read conversation state: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::History,
                    format!("state read failed: {}", e),
                ));
                return String::new();
            }
        };

        let max_turns = if options.max_history_turns > 0 {
            options.max_history_turns
        } else {
            self.config.max_history_turns
        };
        let budget = self.config.history_token_budget;

        let context = if options.summarize_history {
            self.history_builder
                .summarize_history(&self.generation, &state.history, max_turns, budget)
                .await
        } else {
            self.history_builder.build_context(&state.history, max_turns, budget)
        };

        if context.is_empty() {
            trace.push(TraceRecord::new(TraceStage::History, "no usable history turns"));
            return context;
        }
        trace.push(TraceRecord::new(
            TraceStage::History,
            format!(
                "context built from history (~{} tokens)",
                self.history_builder.estimate_tokens(&context)
            ),
        ));

        // The LLM relevance gate needs both the global flag and the per-call
        // option; absence of either means "use history as built"
        if self.config.enable_llm_history_relevance_check
            && options.enable_llm_history_relevance_check
        {
            let relevant = self
                .history_builder
                .is_history_relevant(&self.generation, query, &context)
                .await
                .unwrap_or(true);
            if !relevant {
                trace.push(TraceRecord::new(
                    TraceStage::History,
                    "history NOT relevant to query, context cleared",
                ));
                return String::new();
            }
            trace.push(TraceRecord::new(TraceStage::History, "history relevant to query"));
        }

        context
    }

    /// Dispatch on the final intent. Per-branch failures are trace-logged
    /// and collapse to `Unhandled`, falling through to the final guarantee.
    async fn dispatch(
        &self,
        effective_query: &str,
        analysis: &QueryAnalysis,
        options: &OrchestrationOptions,
        conversation_id: &str,
        history_context: &str,
        trace: &mut Vec<TraceRecord>,
    ) -> StrategyOutcome {
        match analysis.intent {
            Intent::Count | Intent::Aggregation => {
                self.run_aggregation(effective_query, analysis, options, trace).await
            }
            Intent::Analysis => {
                let normalized = effective_query.to_lowercase();
                let mentions_code = CODE_VOCABULARY.iter().any(|t| normalized.contains(t));
                let has_data_source = options
                    .data_source_ids
                    .iter()
                    .any(|s| s.trim().parse::<i64>().is_ok());
                if mentions_code {
                    trace.push(TraceRecord::new(
                        TraceStage::Routing,
                        "analysis intent mentions code, routing to analytical execution",
                    ));
                    self.run_analytical(effective_query, conversation_id, options, trace).await
                } else if has_financial_entities(&analysis.entity_types) && has_data_source {
                    trace.push(TraceRecord::new(
                        TraceStage::Routing,
                        "analysis intent with financial entities and data source, routing to aggregation",
                    ));
                    self.run_aggregation(effective_query, analysis, options, trace).await
                } else {
                    trace.push(TraceRecord::new(
                        TraceStage::Routing,
                        "analysis intent, routing to DirectRAG",
                    ));
                    self.run_direct_rag(effective_query, analysis, options, history_context, trace)
                        .await
                }
            }
            Intent::AnalyticalCode | Intent::AnalyticalProgramming => {
                self.run_analytical(effective_query, conversation_id, options, trace).await
            }
            Intent::Comparison | Intent::Summary | Intent::General | Intent::InformationSeeking => {
                trace.push(TraceRecord::new(TraceStage::Routing, "routing to DirectRAG"));
                self.run_direct_rag(effective_query, analysis, options, history_context, trace)
                    .await
            }
        }
    }

    async fn run_direct_rag(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        options: &OrchestrationOptions,
        history_context: &str,
        trace: &mut Vec<TraceRecord>,
    ) -> StrategyOutcome {
        let top_k = options.top_k.max(analysis.search_limit);
        let documents = match bounded(options.query_timeout_ms, self.retrieval.search(query, top_k))
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Strategy,
                    format!("DirectRAG retrieval failed: {}", e),
                ));
                return StrategyOutcome::Unhandled;
            }
        };
        trace.push(TraceRecord::new(
            TraceStage::Strategy,
            format!("DirectRAG retrieved {} documents", documents.len()),
        ));

        if documents.is_empty() {
            // Nothing to ground on; the final guarantee answers from the query alone
            return StrategyOutcome::Retrieval {
                answer: NO_ANSWER_SENTINEL.to_string(),
                documents,
            };
        }

        let context: String = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut prompt = String::new();
        if !history_context.is_empty() {
            prompt.push_str(&format!("Conversation so far:\n{}\n\n", history_context));
        }
        prompt.push_str(&format!(
            "Answer the question using the context below.\n\nContext:\n{}\n\nQuestion: {}",
            context, query
        ));

        match bounded(
            options.query_timeout_ms,
            self.generation.generate(&prompt, &self.generation_options(analysis, options)),
        )
        .await
        {
            Ok(output) if !output.content.trim().is_empty() => {
                trace.push(TraceRecord::new(
                    TraceStage::Generation,
                    format!("answer synthesized with model {}", output.model_used),
                ));
                StrategyOutcome::Retrieval {
                    answer: output.content.trim().to_string(),
                    documents,
                }
            }
            Ok(_) => {
                trace.push(TraceRecord::new(
                    TraceStage::Generation,
                    "generation returned empty content",
                ));
                StrategyOutcome::Retrieval {
                    answer: NO_ANSWER_SENTINEL.to_string(),
                    documents,
                }
            }
            Err(e) => {
                warn!("DirectRAG generation failed: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Strategy,
                    format!("DirectRAG generation failed: {}", e),
                ));
                StrategyOutcome::Retrieval {
                    answer: NO_ANSWER_SENTINEL.to_string(),
                    documents,
                }
            }
        }
    }

    async fn run_aggregation(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        options: &OrchestrationOptions,
        trace: &mut Vec<TraceRecord>,
    ) -> StrategyOutcome {
        // First id parseable as an integer wins; absence means all sources
        let data_source_id = options
            .data_source_ids
            .iter()
            .find_map(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(ALL_SOURCES_ID);
        trace.push(TraceRecord::new(
            TraceStage::Routing,
            format!("aggregation path (data_source_id={})", data_source_id),
        ));

        let output = match bounded(
            options.query_timeout_ms,
            self.aggregation
                .aggregate(query, data_source_id, analysis.requires_full_dataset),
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Aggregation failed: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Strategy,
                    format!("aggregation failed: {}", e),
                ));
                return StrategyOutcome::Unhandled;
            }
        };
        trace.push(TraceRecord::new(
            TraceStage::Strategy,
            format!("aggregation produced {} result rows", output.rows.len()),
        ));

        // The structured explanation is re-synthesized into conversational prose;
        // on generation failure the raw explanation is already a valid answer
        let prompt = format!(
            "Question: {}\n\nData result: {}\n\nRestate the data result as a short, \
             conversational answer to the question.",
            query, output.explanation
        );
        let answer = match bounded(
            options.query_timeout_ms,
            self.generation.generate(&prompt, &self.generation_options(analysis, options)),
        )
        .await
        {
            Ok(generated) if !generated.content.trim().is_empty() => {
                trace.push(TraceRecord::new(
                    TraceStage::Generation,
                    format!("aggregation explanation synthesized with model {}", generated.model_used),
                ));
                generated.content.trim().to_string()
            }
            Ok(_) => output.explanation.clone(),
            Err(e) => {
                warn!("Aggregation answer synthesis failed, using raw explanation: {}", e);
                output.explanation.clone()
            }
        };

        StrategyOutcome::Aggregation {
            answer,
            rows: output.rows,
            explanation: output.explanation,
        }
    }

    async fn run_analytical(
        &self,
        query: &str,
        conversation_id: &str,
        options: &OrchestrationOptions,
        trace: &mut Vec<TraceRecord>,
    ) -> StrategyOutcome {
        trace.push(TraceRecord::new(TraceStage::Routing, "analytical execution path"));

        match bounded(
            options.query_timeout_ms,
            self.analytical.run_analytical(query, conversation_id),
        )
        .await
        {
            Ok(output) => {
                trace.push(TraceRecord::new(
                    TraceStage::Strategy,
                    format!("analytical run produced {} artifacts", output.artifacts.len()),
                ));
                StrategyOutcome::Analytical {
                    answer: output.final_answer,
                    artifacts: output.artifacts,
                }
            }
            Err(e) => {
                warn!("Analytical execution failed: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Strategy,
                    format!("analytical execution failed: {}", e),
                ));
                StrategyOutcome::Unhandled
            }
        }
    }

    /// One more generation call using whatever partial material exists, in
    /// priority order: preliminary answer text, then retrieved content, then
    /// the bare query. Returns the answer and an error string when even this
    /// step failed.
    async fn final_guarantee(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        options: &OrchestrationOptions,
        preliminary: &str,
        documents: &[RetrievedDocument],
        history_context: &str,
        trace: &mut Vec<TraceRecord>,
    ) -> (String, Option<String>) {
        let material = if !preliminary.trim().is_empty() && preliminary != NO_ANSWER_SENTINEL {
            Some(preliminary.to_string())
        } else if !documents.is_empty() {
            Some(
                documents
                    .iter()
                    .map(|d| d.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        } else {
            None
        };

        let mut prompt = String::new();
        if !history_context.is_empty() {
            prompt.push_str(&format!("Conversation so far:\n{}\n\n", history_context));
        }
        match &material {
            Some(material) => prompt.push_str(&format!(
                "Using the partial material below, give the best possible answer to the \
                 question.\n\nMaterial:\n{}\n\nQuestion: {}",
                material, query
            )),
            None => prompt.push_str(&format!(
                "Answer the following question as helpfully as you can. If you cannot know \
                 the answer, say so briefly.\n\nQuestion: {}",
                query
            )),
        }

        trace.push(TraceRecord::new(
            TraceStage::Generation,
            format!("final-answer guarantee invoked (material: {})", material.is_some()),
        ));

        match bounded(
            options.query_timeout_ms,
            self.generation.generate(&prompt, &self.generation_options(analysis, options)),
        )
        .await
        {
            Ok(output) if !output.content.trim().is_empty() => {
                (output.content.trim().to_string(), None)
            }
            Ok(_) => (
                ERROR_ANSWER.to_string(),
                Some("final-answer generation returned empty content".to_string()),
            ),
            Err(e) => {
                error!("Final-answer generation failed: {}", e);
                trace.push(TraceRecord::new(
                    TraceStage::Generation,
                    format!("final-answer generation failed: {}", e),
                ));
                (ERROR_ANSWER.to_string(), Some(e.to_string()))
            }
        }
    }

    fn generation_options(
        &self,
        analysis: &QueryAnalysis,
        options: &OrchestrationOptions,
    ) -> GenerationOptions {
        GenerationOptions {
            model: Some(self.config.model_for_complexity(analysis.complexity).to_string()),
            temperature: options.temperature,
            max_tokens: None,
            system_prompt: options.system_prompt.clone(),
        }
    }
}

/// Bound an external call by the caller-supplied timeout; a timeout fails
/// like any other collaborator error
async fn bounded<T, F>(timeout_ms: Option<u64>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| anyhow!("external call timed out after {}ms", ms))?,
        None => fut.await,
    }
}
