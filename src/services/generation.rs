use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Config;
use crate::services::memory_generation::MemoryGenerationService;
use crate::services::{GenerationOptions, GenerationOutput, GenerationServiceTrait};

const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Generation adapter backed by the OpenAI chat completions API. Model
/// selection is complexity driven (see `Config::model_for_complexity`) and
/// overridable per call via `GenerationOptions::model`.
#[derive(Clone, Debug)]
pub struct OpenAiGenerationService {
    client: Client,
    api_key: String,
    default_model: String,
}

impl OpenAiGenerationService {
    /// Create a new service from config. Returns `None` when no API key is
    /// configured; callers then fall back to the in-memory generation service.
    pub fn new(config: &Config) -> Option<Self> {
        match &config.open_ai_key {
            Some(api_key) if !api_key.trim().is_empty() => {
                info!("Generation service initialized with OpenAI API key");
                Some(Self {
                    client: Client::builder()
                        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                        .build()
                        .unwrap_or_else(|_| Client::new()),
                    api_key: api_key.clone(),
                    default_model: config.model_high.clone(),
                })
            }
            _ => {
                info!("OpenAI API key not set, generation service not initialized");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl GenerationServiceTrait for OpenAiGenerationService {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationOutput> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut messages = Vec::new();
        if let Some(system_prompt) = &options.system_prompt {
            messages.push(json!({ "role": "system", "content": system_prompt }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut request_body = json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            request_body["max_tokens"] = json!(max_tokens);
        }

        debug!("Sending generation request to OpenAI with model: {}", model);

        let response = self
            .client
            .post(OPENAI_CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("OpenAI request timed out after {} seconds", REQUEST_TIMEOUT_SECS);
                    anyhow!("OpenAI API request timed out after {} seconds", REQUEST_TIMEOUT_SECS)
                } else if e.is_connect() {
                    error!("Failed to connect to OpenAI API: {}", e);
                    anyhow!("Failed to connect to OpenAI API: {}", e)
                } else {
                    error!("Failed to send request to OpenAI API: {}", e);
                    anyhow!("Failed to send request to OpenAI API: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            error!("OpenAI API error: Status {}, Details: {}", status, error_text);
            return Err(anyhow!("OpenAI API error: Status {}, Details: {}", status, error_text));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI API response as JSON: {}", e);
            anyhow!("Failed to parse OpenAI API response: {}", e)
        })?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                error!("Could not extract content from OpenAI response: {:?}", response_json);
                anyhow!("Could not extract content from OpenAI response")
            })?;

        let model_used = response_json["model"].as_str().unwrap_or(model).to_string();

        debug!("Generation completed with model {}", model_used);
        Ok(GenerationOutput {
            content: content.to_string(),
            model_used,
        })
    }
}

/// Runtime-selected generation backend: OpenAI when an API key is
/// configured, template answers otherwise
#[derive(Clone, Debug)]
pub enum GenerationBackend {
    OpenAi(OpenAiGenerationService),
    Memory(MemoryGenerationService),
}

impl GenerationBackend {
    pub fn from_config(config: &Config) -> Self {
        match OpenAiGenerationService::new(config) {
            Some(service) => GenerationBackend::OpenAi(service),
            None => GenerationBackend::Memory(MemoryGenerationService::new()),
        }
    }
}

#[async_trait::async_trait]
impl GenerationServiceTrait for GenerationBackend {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationOutput> {
        match self {
            GenerationBackend::OpenAi(service) => service.generate(prompt, options).await,
            GenerationBackend::Memory(service) => service.generate(prompt, options).await,
        }
    }
}
