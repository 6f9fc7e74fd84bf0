use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Closed set of query intent categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    General,
    Count,
    Aggregation,
    Analysis,
    AnalyticalCode,
    AnalyticalProgramming,
    Comparison,
    Summary,
    InformationSeeking,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::General => "general",
            Intent::Count => "count",
            Intent::Aggregation => "aggregation",
            Intent::Analysis => "analysis",
            Intent::AnalyticalCode => "analytical_code",
            Intent::AnalyticalProgramming => "analytical_programming",
            Intent::Comparison => "comparison",
            Intent::Summary => "summary",
            Intent::InformationSeeking => "information_seeking",
        }
    }
}

/// Finer classification for count queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountType {
    /// Count of unique values ("how many different investors...")
    Distinct,
    /// Total row/record count ("how many deals in total...")
    Total,
}

/// Analyzer complexity score, used to pick a generation model tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// A time range hinted at by the query text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFrame {
    /// The raw phrase the range was extracted from
    pub description: String,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

/// Static analysis of a single query, produced fresh per query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub complexity: Complexity,
    pub data_visualization: bool,
    pub is_analytical: bool,
    pub entity_types: BTreeSet<String>,
    pub search_limit: usize,
    pub similarity_threshold: f32,
    pub time_frame: Option<TimeFrame>,
    pub requires_full_dataset: bool,
}

impl Default for QueryAnalysis {
    fn default() -> Self {
        Self {
            intent: Intent::General,
            complexity: Complexity::Medium,
            data_visualization: false,
            is_analytical: false,
            entity_types: BTreeSet::new(),
            search_limit: 10,
            similarity_threshold: 0.7,
            time_frame: None,
            requires_full_dataset: false,
        }
    }
}

/// Per-query metadata carried through to the response and persisted in the turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub original_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_type: Option<CountType>,
    pub entity_types: BTreeSet<String>,
}

impl QueryMetadata {
    /// The query actually used for retrieval and generation
    pub fn effective_query(&self) -> &str {
        self.rewritten_query.as_deref().unwrap_or(&self.original_query)
    }
}
