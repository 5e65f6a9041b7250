pub mod models;
pub mod prompt;
pub mod providers;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::llm::models::GenerationResult;

/// One-shot text completion against an external generative model.
///
/// Implementations enforce their own request timeout; the provider is not
/// trusted for liveness.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

pub struct LlmManager {
    backend: Box<dyn TextCompletion>,
    configured: bool,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, PipelineError> {
        let backend: Box<dyn TextCompletion> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            other => {
                return Err(PipelineError::ModelUnavailable(format!(
                    "unsupported LLM backend: {}",
                    other
                )));
            }
        };

        Ok(Self {
            backend,
            configured: config.api_key.is_some() || config.backend == "remote",
        })
    }

    /// Sends a prepared prompt and parses the response into a single
    /// candidate statement.
    pub async fn generate(&self, prompt: &str) -> Result<GenerationResult, PipelineError> {
        let raw = self.backend.complete(prompt).await?;
        Ok(GenerationResult::from_raw(raw))
    }

    /// Cheap health probe: whether a model is configured at all. Does not
    /// spend quota on a live call.
    pub fn is_configured(&self) -> bool {
        self.configured
    }
}
