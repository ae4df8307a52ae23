use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Completer;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama-compatible `/api/generate` client.
pub struct OllamaCompleter {
    url: String,
    client: Client,
}

impl OllamaCompleter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Completer for OllamaCompleter {
    async fn complete(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String> {
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let res = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(&req)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(anyhow!(
                "completion API error {}: {}",
                status,
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: GenerateResponse = res.json().await?;
        Ok(parsed.response.trim().to_string())
    }
}
