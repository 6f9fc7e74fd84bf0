use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::models::response::RetrievedDocument;
use crate::services::RetrievalServiceTrait;

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RetrievedDocument>,
}

/// Retrieval client for the external vector index service
#[derive(Clone, Debug)]
pub struct HttpRetrievalService {
    client: Client,
    base_url: String,
}

impl HttpRetrievalService {
    pub fn new(config: &Config) -> Self {
        info!("Retrieval service initialized at {}", config.retrieval_url);
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.retrieval_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl RetrievalServiceTrait for HttpRetrievalService {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "query": query, "top_k": top_k }))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach vector index at {}: {}", url, e);
                anyhow!("Failed to reach vector index: {}", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            error!("Vector index error: Status {}, Details: {}", status, body);
            return Err(anyhow!("Vector index error: Status {}", status));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse vector index response: {}", e))?;

        info!("Vector index returned {} documents", parsed.results.len());
        Ok(parsed.results)
    }
}
