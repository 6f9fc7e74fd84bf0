use crate::models::query::{CountType, Intent};

/// Pluggable query intent classification. The shipped implementation is
/// keyword based; a model-backed classifier can slot in behind the same
/// interface.
pub trait IntentClassifier: Send + Sync + 'static {
    /// Map a lowercased query to one intent category. Must be deterministic
    /// and must never fail; unknown input yields `Intent::General`.
    fn classify(&self, normalized_query: &str) -> Intent;

    /// Finer classification for count queries; `None` when ambiguous.
    /// Only meaningful when `classify` returned `Intent::Count`.
    fn count_type(&self, normalized_query: &str) -> Option<CountType>;
}

/// Keyword/pattern-based classifier. Intentionally permissive: ambiguous
/// queries default to `General`.
#[derive(Debug, Clone, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

const COUNT_PATTERNS: &[&str] = &["how many", "number of"];

const AGGREGATION_PATTERNS: &[&str] = &[
    "sum of", "total of", "average", "mean of", "median", "maximum", "minimum",
    "highest", "lowest", "aggregate",
];

const CODE_PATTERNS: &[&str] = &[
    "run code", "execute code", "write code", "python", "script", "compute with code",
];

const PROGRAMMING_PATTERNS: &[&str] = &["program", "algorithm", "implement a function"];

const COMPARISON_PATTERNS: &[&str] = &["compare", " versus ", " vs ", " vs.", "difference between"];

const SUMMARY_PATTERNS: &[&str] = &["summarize", "summary of", "overview of", "brief me", "tl;dr"];

const ANALYSIS_PATTERNS: &[&str] = &[
    "analyze", "analysis", "insight", "correlation", "trend", "why did", "why is", "pattern",
];

const INFO_SEEKING_PATTERNS: &[&str] = &[
    "what is", "what are", "who is", "who are", "where is", "when did", "when was",
    "tell me about", "describe",
];

/// Whole-word match, so "count" fires on "the customer count" but not on
/// "discount"
fn contains_word(query: &str, word: &str) -> bool {
    query
        .split_whitespace()
        .any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == word)
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, normalized_query: &str) -> Intent {
        let q = normalized_query;

        // Order matters: specific intents win over the broad info-seeking bucket
        if COUNT_PATTERNS.iter().any(|p| q.contains(p)) || contains_word(q, "count") {
            return Intent::Count;
        }
        if CODE_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::AnalyticalCode;
        }
        if PROGRAMMING_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::AnalyticalProgramming;
        }
        if AGGREGATION_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::Aggregation;
        }
        if COMPARISON_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::Comparison;
        }
        if SUMMARY_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::Summary;
        }
        if ANALYSIS_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::Analysis;
        }
        if INFO_SEEKING_PATTERNS.iter().any(|p| q.contains(p)) {
            return Intent::InformationSeeking;
        }

        Intent::General
    }

    fn count_type(&self, normalized_query: &str) -> Option<CountType> {
        let q = normalized_query;
        if q.contains("unique") || q.contains("distinct") || q.contains("different") {
            Some(CountType::Distinct)
        } else if q.contains("total") || q.contains("overall") || q.contains("in all") {
            Some(CountType::Total)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(query: &str) -> Intent {
        KeywordIntentClassifier::new().classify(&query.to_lowercase())
    }

    #[test]
    fn count_queries() {
        assert_eq!(classify("How many customers do we have?"), Intent::Count);
        assert_eq!(classify("Number of deals in 2023"), Intent::Count);
    }

    #[test]
    fn trailing_and_embedded_count_words() {
        assert_eq!(classify("Give me the customer count"), Intent::Count);
        assert_eq!(classify("Count the deals per sector"), Intent::Count);
        assert_ne!(classify("What discount do we offer?"), Intent::Count);
    }

    #[test]
    fn aggregation_queries() {
        assert_eq!(classify("What is the average deal size?"), Intent::Aggregation);
        assert_eq!(classify("Sum of investments by sector"), Intent::Aggregation);
    }

    #[test]
    fn code_and_programming_queries() {
        assert_eq!(classify("Run code to cluster the companies"), Intent::AnalyticalCode);
        assert_eq!(
            classify("Design an algorithm for ranking funds"),
            Intent::AnalyticalProgramming
        );
    }

    #[test]
    fn comparison_and_summary_queries() {
        assert_eq!(classify("Compare fund A and fund B"), Intent::Comparison);
        assert_eq!(classify("Give me a summary of the portfolio"), Intent::Summary);
    }

    #[test]
    fn analysis_queries() {
        assert_eq!(classify("Analyze churn patterns"), Intent::Analysis);
    }

    #[test]
    fn info_seeking_and_general_fallback() {
        assert_eq!(classify("What is the refund policy?"), Intent::InformationSeeking);
        assert_eq!(classify("refund policy"), Intent::General);
        assert_eq!(classify(""), Intent::General);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = KeywordIntentClassifier::new();
        for _ in 0..3 {
            assert_eq!(classifier.classify("how many unique investors"), Intent::Count);
        }
    }

    #[test]
    fn count_types() {
        let classifier = KeywordIntentClassifier::new();
        assert_eq!(
            classifier.count_type("how many unique investors"),
            Some(CountType::Distinct)
        );
        assert_eq!(
            classifier.count_type("how many deals in total"),
            Some(CountType::Total)
        );
        assert_eq!(classifier.count_type("how many deals"), None);
    }
}
