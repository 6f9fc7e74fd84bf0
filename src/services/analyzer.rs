use log::debug;
use regex::Regex;

use crate::models::query::{Complexity, Intent, QueryAnalysis, TimeFrame};
use crate::services::entities::extract_entity_types;
use crate::services::intent::IntentClassifier;

/// Default retrieval breadth for ordinary queries
const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Retrieval breadth when the query needs the full dataset
const FULL_DATASET_SEARCH_LIMIT: usize = 50;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

const ANALYTICAL_TERMS: &[&str] = &[
    "analyze", "analysis", "trend", "correlat", "distribution", "compare",
    "comparison", "forecast", "predict", "growth", "decline", "breakdown",
];

const VISUALIZATION_TERMS: &[&str] = &[
    "chart", "graph", "plot", "trend", "distribution", "compare", "visualiz",
];

const INTERROGATIVES: &[&str] = &["what", "who", "where", "when", "why", "how", "which"];

const CONNECTORS: &[&str] = &["because", "therefore", "so that", "in order to", "explain"];

const FULL_SCOPE_TERMS: &[&str] = &["all ", "total", "every", "entire", "overall"];

const AGGREGATION_VERBS: &[&str] = &["count", "sum", "average", "list", "aggregate", "add up"];

const NUMERIC_METRICS: &[&str] = &[
    "revenue", "sales", "amount", "deal", "investment", "funding", "valuation", "profit",
];

/// Lightweight static classification of a query: complexity, visualization
/// need, analytical flag, time-frame hints. Pure function of the query text.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    year_range_re: Regex,
    year_re: Regex,
    relative_re: Regex,
}

impl QueryAnalyzer {
    pub fn new() -> Self {
        // The patterns are static, so compilation cannot fail at runtime
        Self {
            year_range_re: Regex::new(r"\b(19|20)\d{2}\s*(?:-|to|through|until)\s*((?:19|20)\d{2})\b")
                .unwrap(),
            year_re: Regex::new(r"\b((?:19|20)\d{2})\b").unwrap(),
            relative_re: Regex::new(r"\blast\s+(\d+)\s+(year|month|quarter|week|day)s?\b").unwrap(),
        }
    }

    /// Analyze a query. Never errors; falls back to medium/false defaults.
    pub fn analyze(&self, query: &str, classifier: &dyn IntentClassifier) -> QueryAnalysis {
        let normalized = query.to_lowercase();

        let intent = classifier.classify(&normalized);
        let is_analytical = ANALYTICAL_TERMS.iter().any(|t| normalized.contains(t))
            || matches!(
                intent,
                Intent::Analysis | Intent::AnalyticalCode | Intent::AnalyticalProgramming
            );
        let data_visualization = VISUALIZATION_TERMS.iter().any(|t| normalized.contains(t));
        let requires_full_dataset = Self::requires_full_dataset(&normalized);
        let complexity = self.score_complexity(&normalized, is_analytical);

        let search_limit = if requires_full_dataset {
            FULL_DATASET_SEARCH_LIMIT
        } else {
            DEFAULT_SEARCH_LIMIT
        };

        let analysis = QueryAnalysis {
            intent,
            complexity,
            data_visualization,
            is_analytical,
            entity_types: extract_entity_types(query),
            search_limit,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            time_frame: self.extract_time_frame(&normalized),
            requires_full_dataset,
        };

        debug!(
            "Analyzed query: intent={}, complexity={:?}, full_dataset={}",
            analysis.intent.as_str(),
            analysis.complexity,
            analysis.requires_full_dataset
        );

        analysis
    }

    /// Weighted complexity score from text length, analytical vocabulary,
    /// interrogative count, and explanatory connectors
    fn score_complexity(&self, normalized: &str, is_analytical: bool) -> Complexity {
        let mut score = 0u32;

        if normalized.len() > 200 {
            score += 2;
        } else if normalized.len() > 80 {
            score += 1;
        }

        if is_analytical {
            score += 2;
        }

        let interrogative_count = INTERROGATIVES
            .iter()
            .filter(|w| {
                normalized
                    .split_whitespace()
                    .any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == **w)
            })
            .count();
        if interrogative_count >= 2 {
            score += 2;
        } else if interrogative_count == 1 {
            score += 1;
        }

        if CONNECTORS.iter().any(|c| normalized.contains(c)) {
            score += 1;
        }

        match score {
            0..=1 => Complexity::Low,
            2..=3 => Complexity::Medium,
            _ => Complexity::High,
        }
    }

    /// A query needs the full dataset when a full-scope word combines with
    /// either an aggregation verb or a named numeric metric
    fn requires_full_dataset(normalized: &str) -> bool {
        let full_scope = FULL_SCOPE_TERMS.iter().any(|t| normalized.contains(t));
        if !full_scope {
            return false;
        }
        AGGREGATION_VERBS.iter().any(|v| normalized.contains(v))
            || NUMERIC_METRICS.iter().any(|m| normalized.contains(m))
    }

    fn extract_time_frame(&self, normalized: &str) -> Option<TimeFrame> {
        if let Some(caps) = self.year_range_re.captures(normalized) {
            let phrase = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
            let years: Vec<i32> = self
                .year_re
                .captures_iter(&phrase)
                .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
                .collect();
            return Some(TimeFrame {
                description: phrase,
                start_year: years.first().copied(),
                end_year: years.get(1).copied(),
            });
        }

        if let Some(caps) = self.relative_re.captures(normalized) {
            return Some(TimeFrame {
                description: caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
                start_year: None,
                end_year: None,
            });
        }

        if let Some(caps) = self.year_re.captures(normalized) {
            let year: Option<i32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            return Some(TimeFrame {
                description: caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
                start_year: year,
                end_year: year,
            });
        }

        None
    }
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::intent::KeywordIntentClassifier;

    fn analyze(query: &str) -> QueryAnalysis {
        QueryAnalyzer::new().analyze(query, &KeywordIntentClassifier::new())
    }

    #[test]
    fn short_factual_query_is_low_complexity() {
        let analysis = analyze("What is the refund policy?");
        assert_eq!(analysis.complexity, Complexity::Low);
        assert!(!analysis.is_analytical);
        assert!(!analysis.requires_full_dataset);
        assert_eq!(analysis.search_limit, DEFAULT_SEARCH_LIMIT);
    }

    #[test]
    fn analytical_vocabulary_raises_complexity() {
        let analysis = analyze(
            "Analyze the trend in revenue across all regions and explain why growth declined",
        );
        assert!(analysis.is_analytical);
        assert!(matches!(analysis.complexity, Complexity::Medium | Complexity::High));
    }

    #[test]
    fn visualization_keywords_are_flagged() {
        assert!(analyze("Show me a chart of sales by month").data_visualization);
        assert!(!analyze("What is the refund policy?").data_visualization);
    }

    #[test]
    fn full_scope_plus_aggregation_verb_requires_full_dataset() {
        let analysis = analyze("Count all deals closed this year");
        assert!(analysis.requires_full_dataset);
        assert_eq!(analysis.search_limit, FULL_DATASET_SEARCH_LIMIT);
    }

    #[test]
    fn full_scope_without_metric_or_verb_does_not() {
        assert!(!analyze("Tell me everything about the company culture").requires_full_dataset);
    }

    #[test]
    fn extracts_explicit_year_range() {
        let tf = analyze("Compare revenue between 2020 and growth from 2020 to 2023")
            .time_frame
            .expect("time frame");
        assert_eq!(tf.start_year, Some(2020));
        assert_eq!(tf.end_year, Some(2023));
    }

    #[test]
    fn extracts_single_year() {
        let tf = analyze("How many deals were closed in 2022?").time_frame.expect("time frame");
        assert_eq!(tf.start_year, Some(2022));
        assert_eq!(tf.end_year, Some(2022));
    }

    #[test]
    fn extracts_relative_range() {
        let tf = analyze("What happened over the last 3 months?").time_frame.expect("time frame");
        assert!(tf.description.contains("last 3 month"));
        assert_eq!(tf.start_year, None);
    }

    #[test]
    fn analysis_is_deterministic() {
        let a = analyze("Compare fund performance across sectors");
        let b = analyze("Compare fund performance across sectors");
        assert_eq!(a.intent, b.intent);
        assert_eq!(a.complexity, b.complexity);
        assert_eq!(a.entity_types, b.entity_types);
    }
}
