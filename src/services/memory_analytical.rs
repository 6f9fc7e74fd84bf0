use anyhow::Result;
use log::info;

use crate::models::response::{AnalyticalArtifact, AnalyticalOutput};
use crate::services::AnalyticalServiceTrait;

/// In-memory stand-in for the code-execution sandbox, used in local
/// development and tests. Produces a canned execution summary.
#[derive(Clone, Debug, Default)]
pub struct MemoryAnalyticalService;

impl MemoryAnalyticalService {
    pub fn new() -> Self {
        info!("🗄️ Memory analytical service initialized");
        Self
    }
}

#[async_trait::async_trait]
impl AnalyticalServiceTrait for MemoryAnalyticalService {
    async fn run_analytical(&self, query: &str, session_id: &str) -> Result<AnalyticalOutput> {
        info!("🧮 Memory analytical run for session {}", session_id);
        Ok(AnalyticalOutput {
            final_answer: format!(
                "Analytical execution completed for: {}. No external sandbox is configured, so no computation was performed.",
                query
            ),
            artifacts: vec![AnalyticalArtifact {
                kind: "text".to_string(),
                name: "execution_summary".to_string(),
            }],
        })
    }
}
