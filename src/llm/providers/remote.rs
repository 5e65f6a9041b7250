use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::llm::TextCompletion;

/// OpenAI-compatible chat-completions backend for self-hosted or proxy
/// deployments.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, PipelineError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            PipelineError::ModelUnavailable(
                "API URL is required for the remote backend".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextCompletion for RemoteLlmProvider {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.1,
            max_tokens: 2000,
        };

        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::ModelTimeout
            } else {
                PipelineError::ModelUnavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::ModelUnavailable(format!(
                "API responded with status {}",
                response.status()
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;

        match chat_response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content),
            None => Err(PipelineError::ModelUnavailable(
                "no choices in response".to_string(),
            )),
        }
    }
}
