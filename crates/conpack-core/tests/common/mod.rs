//! Shared fixtures for conpack-core integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conpack_core::errors::InferenceError;
use conpack_core::providers::{InferenceClient, InferenceRequest, InferenceResponse};
use conpack_core::{GenerationConfig, MappingRecord, RuleDescriptor};
use serde_json::json;

/// Scripted inference service. Answers per rule identifier.
pub struct ScriptedClient {
    not_applicable: HashSet<String>,
    garbled: HashSet<String>,
    unreachable: bool,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn answering() -> Self {
        Self {
            not_applicable: HashSet::new(),
            garbled: HashSet::new(),
            unreachable: false,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::answering()
        }
    }

    pub fn not_applicable(mut self, ids: &[&str]) -> Self {
        self.not_applicable
            .extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn garbled(mut self, ids: &[&str]) -> Self {
        self.garbled.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn complete(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = request.rule_identifier.clone();
        self.seen.lock().unwrap().push(id.clone());

        if self.unreachable {
            return Err(InferenceError::Unreachable {
                message: "connection refused".into(),
            });
        }

        let text = if self.not_applicable.contains(&id) {
            json!({"not_applicable": true, "reason": "not a managed rule"}).to_string()
        } else if self.garbled.contains(&id) {
            "Sorry, I cannot help with that.".to_string()
        } else {
            let name = id.to_uppercase().replace('-', "_");
            format!(
                "```json\n{}\n```",
                json!({
                    "rule_identifier": id,
                    "display_name": name,
                    "description": format!("Checks {id}."),
                    "source_owner": "AWS",
                    "source_identifier": name,
                    "parameters": [
                        {"name": "maxAge", "required": false, "default": 90}
                    ]
                })
            )
        };

        Ok(InferenceResponse {
            text,
            provider: "scripted".into(),
            model: "scripted".into(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn shared(client: ScriptedClient) -> Arc<ScriptedClient> {
    Arc::new(client)
}

/// Limits small enough for tests to run in milliseconds.
pub fn fast_config() -> GenerationConfig {
    GenerationConfig {
        enrichment_timeout: Duration::from_secs(5),
        batch_timeout: Duration::from_secs(30),
        enrichment_max_retries: 1,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(2),
        assembly_wait: Duration::from_millis(50),
        assembly_poll_interval: Duration::from_millis(10),
        ..GenerationConfig::default()
    }
}

pub fn rule_id(i: usize) -> String {
    format!("rule-{i:03}")
}

pub fn mapping(job: &str, control: &str, rule: &str) -> MappingRecord {
    MappingRecord {
        mapping_id: format!("{control}:{rule}"),
        control_id: control.into(),
        control_description: format!("Description of {control}"),
        rule_identifier: rule.into(),
        relevance_explanation: format!("{rule} evidences {control}"),
        job_id: job.into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
    }
}

pub fn descriptor(id: &str, description_len: usize) -> RuleDescriptor {
    RuleDescriptor {
        rule_identifier: id.into(),
        display_name: id.to_uppercase().replace('-', "_"),
        description: "d".repeat(description_len),
        parameters: vec![],
        source_owner: "AWS".into(),
        source_identifier: id.to_uppercase().replace('-', "_"),
    }
}
