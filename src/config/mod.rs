use dotenv::dotenv;
use std::env;

use crate::models::query::Complexity;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// OpenAI API key; generation falls back to the in-memory service when unset
    pub open_ai_key: Option<String>,
    /// Cheap model tier, used for low-complexity queries
    pub model_low: String,
    /// Capable model tier, used for medium/high-complexity queries
    pub model_high: String,
    /// Default number of history turns carried into a prompt
    pub max_history_turns: usize,
    /// Approximate token budget for the built history context
    pub history_token_budget: usize,
    /// Characters-per-token ratio used to estimate token counts
    pub chars_per_token: usize,
    /// Global switch for the LLM history relevance gate; the per-call
    /// option must also be set for the gate to run
    pub enable_llm_history_relevance_check: bool,
    /// Base URL of the vector index service (external-services builds)
    pub retrieval_url: String,
    /// Base URL of the code-execution sandbox (external-services builds)
    pub sandbox_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("SERVER_PORT must be a valid port number"),
            open_ai_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model_low: env::var("MODEL_LOW").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            model_high: env::var("MODEL_HIGH").unwrap_or_else(|_| "gpt-4o".to_string()),
            max_history_turns: env::var("MAX_HISTORY_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            history_token_budget: env::var("HISTORY_TOKEN_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            chars_per_token: env::var("CHARS_PER_TOKEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            enable_llm_history_relevance_check: env::var("ENABLE_LLM_HISTORY_RELEVANCE_CHECK")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            retrieval_url: env::var("RETRIEVAL_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()),
            sandbox_url: env::var("SANDBOX_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
        }
    }

    /// Pick a model tier from the analyzer's complexity score
    pub fn model_for_complexity(&self, complexity: Complexity) -> &str {
        match complexity {
            Complexity::Low => &self.model_low,
            Complexity::Medium | Complexity::High => &self.model_high,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            open_ai_key: None,
            model_low: "gpt-4o-mini".to_string(),
            model_high: "gpt-4o".to_string(),
            max_history_turns: 5,
            history_token_budget: 2000,
            chars_per_token: 4,
            enable_llm_history_relevance_check: false,
            retrieval_url: "http://127.0.0.1:6333".to_string(),
            sandbox_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}
