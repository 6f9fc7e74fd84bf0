use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use query_orchestrator::config::Config;
use query_orchestrator::models::conversation::ConversationTurn;
use query_orchestrator::models::query::{Intent, QueryMetadata};
use query_orchestrator::models::response::{
    AggregationOutput, AnalyticalOutput, AnsweredResult, OrchestrationOptions, RetrievedDocument,
    ERROR_ANSWER,
};
use query_orchestrator::services::{
    AggregationServiceTrait, AnalyticalServiceTrait, GenerationOptions, GenerationOutput,
    GenerationServiceTrait, QueryOrchestrator, RetrievalServiceTrait,
};

#[derive(Clone, Default)]
struct StubRetrieval {
    documents: Vec<RetrievedDocument>,
    delay: Option<Duration>,
}

impl StubRetrieval {
    fn with_documents(contents: &[&str]) -> Self {
        Self {
            documents: contents
                .iter()
                .enumerate()
                .map(|(i, content)| RetrievedDocument {
                    id: i.to_string(),
                    content: content.to_string(),
                    score: 0.9,
                    metadata: Default::default(),
                })
                .collect(),
            delay: None,
        }
    }
}

#[async_trait::async_trait]
impl RetrievalServiceTrait for StubRetrieval {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut documents = self.documents.clone();
        documents.truncate(top_k);
        Ok(documents)
    }
}

#[derive(Clone, Default)]
struct StubAggregation {
    calls: Arc<Mutex<Vec<i64>>>,
    explanation: String,
}

#[async_trait::async_trait]
impl AggregationServiceTrait for StubAggregation {
    async fn aggregate(
        &self,
        _query: &str,
        data_source_id: i64,
        _requires_full_dataset: bool,
    ) -> Result<AggregationOutput> {
        self.calls.lock().unwrap().push(data_source_id);
        Ok(AggregationOutput {
            rows: vec![serde_json::json!({ "metric": "count", "value": 57 })],
            explanation: self.explanation.clone(),
        })
    }
}

#[derive(Clone, Default)]
struct StubAnalytical;

#[async_trait::async_trait]
impl AnalyticalServiceTrait for StubAnalytical {
    async fn run_analytical(&self, _query: &str, _session_id: &str) -> Result<AnalyticalOutput> {
        Ok(AnalyticalOutput {
            final_answer: "Computed clusters for the portfolio.".to_string(),
            artifacts: Vec::new(),
        })
    }
}

/// Scripted generation backend: canned replies for the relevance gate and
/// the rewriter, a fixed answer otherwise, with full prompt capture
#[derive(Clone, Default)]
struct ScriptedGeneration {
    fail: bool,
    relevance_reply: Option<String>,
    rewrite_reply: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl GenerationServiceTrait for ScriptedGeneration {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationOutput> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(anyhow!("generation service unavailable"));
        }
        let content = if prompt.contains("Answer yes or no") {
            self.relevance_reply.clone().unwrap_or_else(|| "yes".to_string())
        } else if prompt.contains("rewrite the user's latest question") {
            self.rewrite_reply.clone().unwrap_or_default()
        } else {
            "Synthesized answer.".to_string()
        };
        Ok(GenerationOutput {
            content,
            model_used: "scripted".to_string(),
        })
    }
}

type TestOrchestrator =
    QueryOrchestrator<StubRetrieval, StubAggregation, StubAnalytical, ScriptedGeneration>;

fn orchestrator(
    config: Config,
    retrieval: StubRetrieval,
    aggregation: StubAggregation,
    generation: ScriptedGeneration,
) -> TestOrchestrator {
    QueryOrchestrator::new(config, retrieval, aggregation, StubAnalytical, generation)
}

fn seed_turn(orchestrator: &TestOrchestrator, conversation_id: &str, query: &str, answer: &str) {
    let answered = AnsweredResult {
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
    };
    orchestrator
        .store()
        .update_state(conversation_id, ConversationTurn::new(query.to_string(), answered), None)
        .unwrap();
}

#[tokio::test]
async fn simple_query_without_history_takes_direct_rag_path() {
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::with_documents(&["Refunds are accepted within 30 days of purchase."]),
        StubAggregation::default(),
        ScriptedGeneration::default(),
    );

    let response = orchestrator
        .process_user_query("What is the refund policy?", &OrchestrationOptions::default())
        .await;

    assert!(matches!(
        response.query_metadata.intent,
        Intent::InformationSeeking | Intent::General
    ));
    assert!(!response.final_answer.is_empty());
    assert!(response.error.is_none());
    assert!(response.strategy_trace.iter().any(|t| t.contains("DirectRAG")));
}

#[tokio::test]
async fn count_query_routes_to_aggregation_with_parsed_data_source() {
    let aggregation = StubAggregation {
        calls: Arc::new(Mutex::new(Vec::new())),
        explanation: "There are 57 customers.".to_string(),
    };
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        aggregation.clone(),
        ScriptedGeneration::default(),
    );

    let options = OrchestrationOptions {
        data_source_ids: vec!["not-a-number".to_string(), "42".to_string()],
        ..Default::default()
    };
    let response = orchestrator
        .process_user_query("How many customers do we have?", &options)
        .await;

    assert_eq!(response.query_metadata.intent, Intent::Count);
    assert_eq!(aggregation.calls.lock().unwrap().as_slice(), &[42]);
    assert!(response
        .strategy_trace
        .iter()
        .any(|t| t.contains("aggregation path (data_source_id=42)")));
    assert!(!response.final_answer.is_empty());
    assert!(response.error.is_none());
    assert!(!response.source_documents.is_empty());
}

#[tokio::test]
async fn missing_data_source_uses_all_sources_sentinel() {
    let aggregation = StubAggregation {
        calls: Arc::new(Mutex::new(Vec::new())),
        explanation: "Total is 12.".to_string(),
    };
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        aggregation.clone(),
        ScriptedGeneration::default(),
    );

    orchestrator
        .process_user_query("How many deals closed?", &OrchestrationOptions::default())
        .await;

    assert_eq!(aggregation.calls.lock().unwrap().as_slice(), &[0]);
}

#[tokio::test]
async fn irrelevant_history_is_suppressed_before_generation() {
    let config = Config {
        enable_llm_history_relevance_check: true,
        ..Default::default()
    };
    let generation = ScriptedGeneration {
        relevance_reply: Some("no".to_string()),
        ..Default::default()
    };
    let orchestrator = orchestrator(
        config,
        StubRetrieval::with_documents(&["Today's forecast is sunny."]),
        StubAggregation::default(),
        generation.clone(),
    );

    seed_turn(&orchestrator, "c1", "How do refunds work?", "Refunds take 5 days.");

    let options = OrchestrationOptions {
        conversation_id: Some("c1".to_string()),
        enable_llm_history_relevance_check: true,
        ..Default::default()
    };
    let response = orchestrator.process_user_query("What's the weather?", &options).await;

    assert!(response
        .strategy_trace
        .iter()
        .any(|t| t.contains("history NOT relevant")));
    // The cleared context never reaches an answer-synthesis prompt
    let prompts = generation.prompts.lock().unwrap();
    let answer_prompts: Vec<_> = prompts
        .iter()
        .filter(|p| !p.contains("Answer yes or no"))
        .collect();
    assert!(!answer_prompts.is_empty());
    assert!(answer_prompts.iter().all(|p| !p.contains("Refunds take 5 days")));
}

#[tokio::test]
async fn echoed_rewrite_keeps_original_query() {
    let generation = ScriptedGeneration {
        rewrite_reply: Some("what about them?".to_string()),
        ..Default::default()
    };
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::with_documents(&["Acme Corp was founded in 2015."]),
        StubAggregation::default(),
        generation,
    );

    seed_turn(&orchestrator, "c1", "Tell me about Acme Corp", "Acme Corp makes widgets.");

    let options = OrchestrationOptions {
        conversation_id: Some("c1".to_string()),
        ..Default::default()
    };
    let response = orchestrator.process_user_query("what about them?", &options).await;

    assert!(response.query_metadata.rewritten_query.is_none());
    assert_eq!(response.query_metadata.original_query, "what about them?");
}

#[tokio::test]
async fn successful_rewrite_is_recorded_and_redrives_analysis() {
    let generation = ScriptedGeneration {
        rewrite_reply: Some("How many widgets does Acme Corp sell?".to_string()),
        ..Default::default()
    };
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        StubAggregation::default(),
        generation,
    );

    seed_turn(&orchestrator, "c1", "Tell me about Acme Corp", "Acme Corp makes widgets.");

    let options = OrchestrationOptions {
        conversation_id: Some("c1".to_string()),
        ..Default::default()
    };
    let response = orchestrator.process_user_query("how many do they sell?", &options).await;

    assert_eq!(
        response.query_metadata.rewritten_query.as_deref(),
        Some("How many widgets does Acme Corp sell?")
    );
    // Intent is re-derived from the standalone form
    assert_eq!(response.query_metadata.intent, Intent::Count);
}

#[tokio::test]
async fn generation_failure_still_returns_a_response() {
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        StubAggregation::default(),
        ScriptedGeneration {
            fail: true,
            ..Default::default()
        },
    );

    let response = orchestrator
        .process_user_query("Tell me something", &OrchestrationOptions::default())
        .await;

    assert_eq!(response.final_answer, ERROR_ANSWER);
    assert!(response.error.is_some());
    assert!(!response.strategy_trace.is_empty());
}

#[tokio::test]
async fn analytical_intents_route_to_code_execution() {
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        StubAggregation::default(),
        ScriptedGeneration::default(),
    );

    let response = orchestrator
        .process_user_query("Run code to cluster the companies", &OrchestrationOptions::default())
        .await;

    assert_eq!(response.query_metadata.intent, Intent::AnalyticalCode);
    assert_eq!(response.final_answer, "Computed clusters for the portfolio.");
    assert!(response
        .strategy_trace
        .iter()
        .any(|t| t.contains("analytical execution path")));
}

#[tokio::test]
async fn timed_out_retrieval_degrades_into_final_guarantee() {
    let retrieval = StubRetrieval {
        documents: Vec::new(),
        delay: Some(Duration::from_millis(200)),
    };
    let orchestrator = orchestrator(
        Config::default(),
        retrieval,
        StubAggregation::default(),
        ScriptedGeneration::default(),
    );

    let options = OrchestrationOptions {
        query_timeout_ms: Some(10),
        ..Default::default()
    };
    let response = orchestrator.process_user_query("What is the refund policy?", &options).await;

    assert!(!response.final_answer.is_empty());
    assert!(response.strategy_trace.iter().any(|t| t.contains("timed out")));
}

#[tokio::test]
async fn every_turn_is_persisted_in_order() {
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        StubAggregation::default(),
        ScriptedGeneration::default(),
    );

    let options = OrchestrationOptions {
        conversation_id: Some("c1".to_string()),
        user_id: Some("u1".to_string()),
        ..Default::default()
    };
    for query in ["first question", "second question", "third question"] {
        orchestrator.process_user_query(query, &options).await;
    }

    let state = orchestrator.store().get_state("c1").unwrap().expect("state");
    assert_eq!(state.history.len(), 3);
    assert_eq!(state.history[0].user_query, "first question");
    assert_eq!(state.history[2].user_query, "third question");
    assert_eq!(state.user_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn failed_turns_are_persisted_too() {
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::default(),
        StubAggregation::default(),
        ScriptedGeneration {
            fail: true,
            ..Default::default()
        },
    );

    let options = OrchestrationOptions {
        conversation_id: Some("c1".to_string()),
        ..Default::default()
    };
    orchestrator.process_user_query("doomed question", &options).await;

    let state = orchestrator.store().get_state("c1").unwrap().expect("state");
    assert_eq!(state.history.len(), 1);
    assert!(state.history[0].answer.error.is_some());
}

#[tokio::test]
async fn always_returns_a_nonempty_answer_across_option_combinations() {
    let orchestrator = orchestrator(
        Config::default(),
        StubRetrieval::with_documents(&["Some grounding material."]),
        StubAggregation {
            calls: Arc::new(Mutex::new(Vec::new())),
            explanation: "Count is 3.".to_string(),
        },
        ScriptedGeneration::default(),
    );

    let queries = [
        "",
        "What is the refund policy?",
        "How many unique investors are there?",
        "Compare fund A versus fund B",
        "Summarize the portfolio",
        "Run code to compute correlations",
        "Analyze revenue trends across all sectors",
    ];
    let option_sets = [
        OrchestrationOptions::default(),
        OrchestrationOptions {
            use_history: false,
            enable_query_rewriting: false,
            ..Default::default()
        },
        OrchestrationOptions {
            conversation_id: Some("combo".to_string()),
            summarize_history: true,
            data_source_ids: vec!["7".to_string()],
            generate_final_answer: true,
            ..Default::default()
        },
    ];

    for query in queries {
        for options in &option_sets {
            let response = orchestrator.process_user_query(query, options).await;
            assert!(
                !response.final_answer.trim().is_empty(),
                "empty answer for query {:?}",
                query
            );
        }
    }
}
