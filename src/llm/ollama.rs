//! Ollama HTTP provider
//!
//! Thin wrapper over an Ollama-compatible `/api/generate` endpoint.
//! JSON format mode is requested from the server; local models still wrap
//! output in markdown fences often enough that extraction stays as a
//! fallback. Dropping the returned future aborts the in-flight request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::provider::{GenerateOptions, LlmError, LlmProvider};

pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate_json(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Value, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: options.json_format.then_some("json"),
            options: OllamaOptions {
                num_predict: options.max_tokens,
                temperature: options.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(options.timeout_ms))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!(
                "server returned {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Unavailable(format!("malformed envelope: {}", e)))?;

        if parsed.response.trim().is_empty() {
            return Err(LlmError::Refusal("model returned an empty response".to_string()));
        }

        debug!(chars = parsed.response.len(), "LLM response received");
        extract_json_object(&parsed.response)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Pull the first balanced JSON object out of a raw completion,
/// stripping markdown code fences first.
pub fn extract_json_object(raw: &str) -> Result<Value, LlmError> {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```json") {
        if let Some(end) = rest.find("```") {
            text = rest[..end].trim();
        }
    } else if let Some(rest) = text.strip_prefix("```") {
        if let Some(end) = rest.find("```") {
            text = rest[..end].trim();
        }
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let Some(candidate) = first_balanced_object(text) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => {}
            Err(e) => {
                return Err(LlmError::Parse(format!(
                    "extracted candidate is not valid JSON: {}",
                    e
                )))
            }
        }
    }

    Err(LlmError::Parse(format!(
        "no JSON object found in response: {}",
        truncate(raw, 200)
    )))
}

/// First `{…}` substring with balanced braces, string-aware.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
