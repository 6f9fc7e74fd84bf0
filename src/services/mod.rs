pub mod analyzer;
pub mod entities;
pub mod generation;
pub mod history;
pub mod intent;
pub mod orchestrator;
pub mod rewriter;
pub mod store;

pub mod memory_aggregation;
pub mod memory_analytical;
pub mod memory_generation;
pub mod memory_retrieval;

#[cfg(feature = "external-services")]
pub mod retrieval;
#[cfg(feature = "external-services")]
pub mod sandbox;

use anyhow::Result;

use crate::models::response::{AggregationOutput, AnalyticalOutput, RetrievedDocument};

/// Sentinel data source id meaning "aggregate across all sources"
pub const ALL_SOURCES_ID: i64 = 0;

/// Options for a single generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Explicit model override; otherwise picked from query complexity
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

/// Result of a generation call
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub content: String,
    pub model_used: String,
}

// Contracts toward the independently fallible collaborators. Each call is a
// suspension point; the orchestrator never holds conversation locks across them.

#[async_trait::async_trait]
pub trait RetrievalServiceTrait: Send + Sync + 'static {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>>;
}

#[async_trait::async_trait]
pub trait AggregationServiceTrait: Send + Sync + 'static {
    async fn aggregate(
        &self,
        query: &str,
        data_source_id: i64,
        requires_full_dataset: bool,
    ) -> Result<AggregationOutput>;
}

#[async_trait::async_trait]
pub trait AnalyticalServiceTrait: Send + Sync + 'static {
    async fn run_analytical(&self, query: &str, session_id: &str) -> Result<AnalyticalOutput>;
}

#[async_trait::async_trait]
pub trait GenerationServiceTrait: Send + Sync + 'static {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationOutput>;
}

// Re-export the services
pub use analyzer::QueryAnalyzer;
pub use entities::extract_entity_types;
pub use generation::{GenerationBackend, OpenAiGenerationService};
pub use history::HistoryContextBuilder;
pub use intent::{IntentClassifier, KeywordIntentClassifier};
pub use memory_aggregation::MemoryAggregationService;
pub use memory_analytical::MemoryAnalyticalService;
pub use memory_generation::MemoryGenerationService;
pub use memory_retrieval::MemoryRetrievalService;
pub use orchestrator::QueryOrchestrator;
pub use rewriter::QueryRewriter;
pub use store::ConversationStore;
#[cfg(feature = "external-services")]
pub use retrieval::HttpRetrievalService;
#[cfg(feature = "external-services")]
pub use sandbox::SandboxAnalyticalService;
