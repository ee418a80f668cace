//! Inference service boundary used by the Batch Enricher.

mod chat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::InferenceError;

pub use chat::ChatCompletionsClient;

/// Enrichment always runs with deterministic sampling.
pub const ENRICHMENT_TEMPERATURE: f32 = 0.0;

/// One enrichment request; exactly one per rule identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub rule_identifier: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest)
        -> Result<InferenceResponse, InferenceError>;

    fn provider_name(&self) -> &'static str;
}

/// Connection settings for the inference service (config file `inference:`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl InferenceConfig {
    /// Build the HTTP client, reading the API key from the configured variable.
    pub fn build_client(&self) -> Result<ChatCompletionsClient, crate::errors::ConfigError> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            crate::errors::ConfigError::invalid(
                "inference.api_key_env",
                format!("environment variable {} is not set", self.api_key_env),
            )
        })?;
        Ok(ChatCompletionsClient::new(
            self.endpoint.clone(),
            self.model.clone(),
            api_key,
        ))
    }
}
