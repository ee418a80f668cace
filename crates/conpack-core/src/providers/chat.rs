use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::json;
use tracing::debug;

use super::{InferenceClient, InferenceRequest, InferenceResponse};
use crate::errors::InferenceError;

/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// Performs exactly one HTTP call per [`InferenceClient::complete`]; timeouts
/// and retries are applied by the caller.
pub struct ChatCompletionsClient {
    pub endpoint: String,
    pub model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl InferenceClient for ChatCompletionsClient {
    async fn complete(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });

        debug!(
            rule_identifier = %request.rule_identifier,
            endpoint = %self.endpoint,
            prompt_bytes = request.prompt.len(),
            "sending enrichment request"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            200..=299 => {}
            429 => {
                return Err(InferenceError::RateLimited {
                    retry_after: Self::retry_after(resp.headers()),
                })
            }
            code => {
                let message = resp.text().await.unwrap_or_default();
                return Err(if status.is_server_error() {
                    InferenceError::Server {
                        status: code,
                        message,
                    }
                } else {
                    InferenceError::Rejected {
                        status: code,
                        message,
                    }
                });
            }
        }

        let json: serde_json::Value = resp.json().await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| InferenceError::InvalidResponse {
                message: "response missing choices[0].message.content".to_string(),
            })?
            .to_string();

        Ok(InferenceResponse {
            text,
            provider: "chat-completions".to_string(),
            model: self.model.clone(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "chat-completions"
    }
}
