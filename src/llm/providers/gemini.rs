use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::llm::TextCompletion;

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini over the generateContent REST endpoint.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiProvider {
    /// A missing API key is not fatal here; the server still boots and the
    /// health endpoint reports the model as unavailable. Requests fail with
    /// `ModelUnavailable` until a key is supplied.
    pub fn new(config: &LlmConfig) -> Result<Self, PipelineError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

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
impl TextCompletion for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PipelineError::ModelUnavailable(
                "no API key configured for the gemini backend".to_string(),
            )
        })?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        debug!("Sending generateContent request for model {}", self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::ModelTimeout
                } else {
                    PipelineError::ModelUnavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            // 429 here means quota exhaustion, not ephemeral noise.
            return Err(PipelineError::ModelUnavailable(format!(
                "Gemini API responded with status {}",
                response.status()
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PipelineError::ModelUnavailable(
                "Gemini returned an empty response".to_string(),
            ));
        }

        Ok(text)
    }
}
