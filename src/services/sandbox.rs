use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::response::{AnalyticalArtifact, AnalyticalOutput};
use crate::services::AnalyticalServiceTrait;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const EXECUTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    name: String,
    #[serde(rename = "type")]
    file_type: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    stdout: String,
    stderr: String,
    success: bool,
    #[serde(default)]
    files: Vec<FileInfo>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the code-execution sandbox. The sandbox keeps one Python
/// session per container; produced files (plots, tables) come back as
/// artifacts.
#[derive(Clone, Debug)]
pub struct SandboxAnalyticalService {
    client: Client,
    base_url: String,
}

impl SandboxAnalyticalService {
    pub fn new(config: &Config) -> Self {
        info!("Sandbox analytical service initialized at {}", config.sandbox_url);
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.sandbox_url.trim_end_matches('/').to_string(),
        }
    }

    /// Reset the sandbox's persistent session state
    pub async fn reset_session(&self) -> Result<()> {
        let url = format!("{}/session", self.base_url);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to reach sandbox: {}", e))?;
        if !response.status().is_success() {
            return Err(anyhow!("Sandbox session reset failed: {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnalyticalServiceTrait for SandboxAnalyticalService {
    async fn run_analytical(&self, query: &str, session_id: &str) -> Result<AnalyticalOutput> {
        // The sandbox executes raw Python; the analytical prompt is wrapped
        // so the session prints a final result line
        let code = format!(
            "result = run_analysis({:?})\nprint(result)",
            query
        );
        let url = format!("{}/execute", self.base_url);

        info!("Dispatching analytical run for session {}", session_id);
        let response = self
            .client
            .post(&url)
            .json(&ExecuteRequest {
                code: &code,
                timeout: EXECUTION_TIMEOUT_SECS,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach sandbox at {}: {}", url, e);
                anyhow!("Failed to reach sandbox: {}", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Sandbox error: Status {}", status));
        }

        let result: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse sandbox response: {}", e))?;

        if !result.success {
            warn!(
                "Sandbox execution failed: {}",
                result.error.as_deref().unwrap_or(&result.stderr)
            );
            return Err(anyhow!(
                "Sandbox execution failed: {}",
                result.error.unwrap_or(result.stderr)
            ));
        }

        let artifacts = result
            .files
            .iter()
            .map(|f| AnalyticalArtifact {
                kind: f.file_type.clone(),
                name: f.name.clone(),
            })
            .collect();

        Ok(AnalyticalOutput {
            final_answer: result.stdout.trim().to_string(),
            artifacts,
        })
    }
}
