use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{RAGError, Result};

/// Synchronous text generation.
pub trait Generate {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Non-streaming client for Ollama's `/api/generate`.
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Generate for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        log::debug!("POST {} (model {})", self.endpoint, self.model);
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RAGError::GenerationStatus { status, body });
        }

        let parsed: GenerateResponse = resp.json()?;
        Ok(parsed.response)
    }
}
