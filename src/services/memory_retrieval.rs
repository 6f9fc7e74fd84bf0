use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::info;

use crate::models::response::RetrievedDocument;
use crate::services::RetrievalServiceTrait;

/// In-memory retrieval service for local development and tests. Documents
/// are seeded via `add_document` and scored by keyword overlap with the
/// query, standing in for the vector similarity index.
#[derive(Clone, Debug, Default)]
pub struct MemoryRetrievalService {
    documents: Arc<Mutex<Vec<RetrievedDocument>>>,
}

impl MemoryRetrievalService {
    pub fn new() -> Self {
        info!("🗄️ Memory retrieval service initialized");
        Self {
            documents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Seed a document into the index
    pub fn add_document(&self, id: &str, content: &str) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("Failed to lock document store"))?;
        documents.push(RetrievedDocument {
            id: id.to_string(),
            content: content.to_string(),
            score: 0.0,
            metadata: HashMap::new(),
        });
        Ok(())
    }

    fn score(query: &str, content: &str) -> f32 {
        let content_lower = content.to_lowercase();
        // Very short tokens ("is", "the") carry no signal and only add noise
        let terms: Vec<&str> = query
            .split_whitespace()
            .filter(|t| t.len() > 3)
            .collect();
        if terms.is_empty() {
            return 0.0;
        }
        let hits = terms
            .iter()
            .filter(|t| content_lower.contains(&t.to_lowercase()))
            .count();
        hits as f32 / terms.len() as f32
    }
}

#[async_trait::async_trait]
impl RetrievalServiceTrait for MemoryRetrievalService {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("Failed to lock document store"))?;

        let mut scored: Vec<RetrievedDocument> = documents
            .iter()
            .map(|doc| {
                let mut doc = doc.clone();
                doc.score = Self::score(query, &doc.content);
                doc
            })
            .filter(|doc| doc.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        info!("🔍 Memory retrieval returned {} documents for query", scored.len());
        Ok(scored)
    }
}
