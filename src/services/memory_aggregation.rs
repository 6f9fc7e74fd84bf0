use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::info;
use serde_json::json;

use crate::models::response::AggregationOutput;
use crate::services::{AggregationServiceTrait, ALL_SOURCES_ID};

/// In-memory aggregation service for local development and tests. Tables of
/// named numeric values are seeded per data source id; aggregation answers
/// count/sum/average questions over them.
#[derive(Clone, Debug, Default)]
pub struct MemoryAggregationService {
    tables: Arc<Mutex<HashMap<i64, Vec<(String, f64)>>>>,
}

impl MemoryAggregationService {
    pub fn new() -> Self {
        info!("🗄️ Memory aggregation service initialized");
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seed a named numeric row into a data source
    pub fn add_row(&self, data_source_id: i64, label: &str, value: f64) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow!("Failed to lock aggregation tables"))?;
        tables
            .entry(data_source_id)
            .or_default()
            .push((label.to_string(), value));
        Ok(())
    }

    fn rows_for(&self, data_source_id: i64) -> Result<Vec<(String, f64)>> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| anyhow!("Failed to lock aggregation tables"))?;
        if data_source_id == ALL_SOURCES_ID {
            Ok(tables.values().flatten().cloned().collect())
        } else {
            Ok(tables.get(&data_source_id).cloned().unwrap_or_default())
        }
    }
}

#[async_trait::async_trait]
impl AggregationServiceTrait for MemoryAggregationService {
    async fn aggregate(
        &self,
        query: &str,
        data_source_id: i64,
        _requires_full_dataset: bool,
    ) -> Result<AggregationOutput> {
        let rows = self.rows_for(data_source_id)?;
        let normalized = query.to_lowercase();

        let count = rows.len();
        let sum: f64 = rows.iter().map(|(_, v)| v).sum();
        let mean = if count > 0 { sum / count as f64 } else { 0.0 };

        let (result, explanation) = if normalized.contains("how many")
            || normalized.contains("count")
            || normalized.contains("number of")
        {
            (
                json!({ "metric": "count", "value": count }),
                format!("The count over data source {} is {}.", data_source_id, count),
            )
        } else if normalized.contains("average") || normalized.contains("mean") {
            (
                json!({ "metric": "mean", "value": mean }),
                format!("The average over data source {} is {:.2}.", data_source_id, mean),
            )
        } else {
            (
                json!({ "metric": "sum", "value": sum }),
                format!("The total over data source {} is {:.2}.", data_source_id, sum),
            )
        };

        info!(
            "📊 Memory aggregation computed over {} rows of data source {}",
            count, data_source_id
        );

        Ok(AggregationOutput {
            rows: vec![result],
            explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_rows_for_count_queries() {
        let service = MemoryAggregationService::new();
        service.add_row(42, "acme", 10.0).unwrap();
        service.add_row(42, "globex", 20.0).unwrap();

        let output = service.aggregate("How many customers do we have?", 42, false).await.unwrap();
        assert_eq!(output.rows[0]["value"], 2);
        assert!(output.explanation.contains('2'));
    }

    #[tokio::test]
    async fn sentinel_id_spans_all_sources() {
        let service = MemoryAggregationService::new();
        service.add_row(1, "a", 1.0).unwrap();
        service.add_row(2, "b", 2.0).unwrap();

        let output = service
            .aggregate("total amount", ALL_SOURCES_ID, true)
            .await
            .unwrap();
        assert_eq!(output.rows[0]["value"], 3.0);
    }
}
