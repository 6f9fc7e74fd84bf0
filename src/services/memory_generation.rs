use anyhow::Result;
use log::info;

use crate::services::{GenerationOptions, GenerationOutput, GenerationServiceTrait};

const MEMORY_MODEL: &str = "memory-template";

/// Template-based generation service used when no OpenAI API key is
/// configured. Keeps the pipeline fully runnable offline; answers are built
/// from the prompt's grounding material rather than a model.
#[derive(Clone, Debug, Default)]
pub struct MemoryGenerationService;

impl MemoryGenerationService {
    pub fn new() -> Self {
        info!("🗄️ Memory generation service initialized (template answers)");
        Self
    }
}

#[async_trait::async_trait]
impl GenerationServiceTrait for MemoryGenerationService {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationOutput> {
        // Yes/no classification prompts get a permissive "yes" so optional
        // gates behave as if disabled
        let content = if prompt.to_lowercase().contains("answer yes or no") {
            "yes".to_string()
        } else {
            let excerpt: String = prompt.chars().take(400).collect();
            format!("Based on the available information: {}", excerpt)
        };

        Ok(GenerationOutput {
            content,
            model_used: MEMORY_MODEL.to_string(),
        })
    }
}
