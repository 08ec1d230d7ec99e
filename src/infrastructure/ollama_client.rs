//! Text generation through a local Ollama server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{EnrichmentFailure, TextGenerator};
use crate::infrastructure::config::GeneratorConfig;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming client for the `/api/generate` endpoint
pub struct OllamaClient {
    http: Client,
    endpoint: String,
    model: String,
    timeout_seconds: u64,
    temperature: f32,
    top_p: f32,
}

impl OllamaClient {
    pub fn new(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            timeout_seconds: config.timeout_seconds,
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, EnrichmentFailure> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Ollama generate request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnrichmentFailure::Timeout { seconds: self.timeout_seconds }
                } else {
                    EnrichmentFailure::Unreachable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Ollama returned an error status");
            return Err(EnrichmentFailure::Status { status, body });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EnrichmentFailure::Timeout { seconds: self.timeout_seconds }
            } else {
                EnrichmentFailure::Malformed(e.to_string())
            }
        })?;

        Ok(parsed.response)
    }
}
