use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::query::QueryMetadata;

/// Neutral answer used when every strategy failed to produce one
pub const NO_ANSWER_SENTINEL: &str = "No answer determined";

/// Neutral answer returned when an unexpected error aborted processing
pub const ERROR_ANSWER: &str = "An error occurred while processing your query";

/// A document returned by the retrieval or aggregation collaborators.
/// Read-only to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Pipeline stage a trace record was emitted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    Analysis,
    History,
    Rewrite,
    Routing,
    Strategy,
    Generation,
    Persistence,
}

impl TraceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStage::Analysis => "analysis",
            TraceStage::History => "history",
            TraceStage::Rewrite => "rewrite",
            TraceStage::Routing => "routing",
            TraceStage::Strategy => "strategy",
            TraceStage::Generation => "generation",
            TraceStage::Persistence => "persistence",
        }
    }
}

/// One decision taken while answering a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub stage: TraceStage,
    pub detail: String,
}

impl TraceRecord {
    pub fn new(stage: TraceStage, detail: impl Into<String>) -> Self {
        Self { stage, detail: detail.into() }
    }

    /// Render to the human-readable form used at the HTTP boundary
    pub fn render(&self) -> String {
        format!("[{}] {}", self.stage.as_str(), self.detail)
    }
}

/// An artifact produced by the analytical collaborator (plot, file, table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalArtifact {
    pub kind: String,
    pub name: String,
}

/// Output of the aggregation collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationOutput {
    pub rows: Vec<serde_json::Value>,
    pub explanation: String,
}

/// Output of the analytical collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalOutput {
    pub final_answer: String,
    pub artifacts: Vec<AnalyticalArtifact>,
}

/// What a dispatched strategy produced, tagged by the originating path
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Retrieval {
        answer: String,
        documents: Vec<RetrievedDocument>,
    },
    Aggregation {
        answer: String,
        rows: Vec<serde_json::Value>,
        explanation: String,
    },
    Analytical {
        answer: String,
        artifacts: Vec<AnalyticalArtifact>,
    },
    /// No route matched the intent; the final guarantee takes over
    Unhandled,
}

impl StrategyOutcome {
    pub fn answer(&self) -> &str {
        match self {
            StrategyOutcome::Retrieval { answer, .. } => answer,
            StrategyOutcome::Aggregation { answer, .. } => answer,
            StrategyOutcome::Analytical { answer, .. } => answer,
            StrategyOutcome::Unhandled => NO_ANSWER_SENTINEL,
        }
    }
}

/// Complete answer to one query, persisted in the conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweredResult {
    pub final_answer: String,
    pub source_documents: Vec<RetrievedDocument>,
    pub query_metadata: QueryMetadata,
    pub strategy_trace: Vec<TraceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Options accepted by `process_user_query`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationOptions {
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    /// Restricts retrieval/aggregation scope; the first id parseable as an
    /// integer is used for aggregation routing
    pub data_source_ids: Vec<String>,
    pub use_history: bool,
    /// Hard override of `use_history` when set
    pub force_use_history: Option<bool>,
    pub max_history_turns: usize,
    pub summarize_history: bool,
    pub enable_llm_history_relevance_check: bool,
    pub enable_query_rewriting: bool,
    pub top_k: usize,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub query_timeout_ms: Option<u64>,
    pub generate_final_answer: bool,
}

impl Default for OrchestrationOptions {
    fn default() -> Self {
        Self {
            conversation_id: None,
            user_id: None,
            data_source_ids: Vec::new(),
            use_history: true,
            force_use_history: None,
            max_history_turns: 5,
            summarize_history: false,
            enable_llm_history_relevance_check: false,
            enable_query_rewriting: true,
            top_k: 10,
            temperature: 0.2,
            system_prompt: None,
            query_timeout_ms: None,
            generate_final_answer: true,
        }
    }
}

/// Request body for the query endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub options: OrchestrationOptions,
}

/// Response returned to the caller for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratedResponse {
    pub final_answer: String,
    pub source_documents: Vec<RetrievedDocument>,
    pub query_metadata: QueryMetadata,
    /// Human-readable audit log of every decision taken
    pub strategy_trace: Vec<String>,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
}
