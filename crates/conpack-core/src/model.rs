//! Records flowing through the pipeline.
//!
//! Everything here is write-once: a stage produces a value, persists it, and
//! later stages only read it.

use serde::{Deserialize, Serialize};

/// One control-to-rule association, written upstream and read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    #[serde(default)]
    pub mapping_id: String,
    pub control_id: String,
    #[serde(default)]
    pub control_description: String,
    #[serde(alias = "config_rule_identifier")]
    pub rule_identifier: String,
    #[serde(default)]
    pub relevance_explanation: String,
    pub job_id: String,
    #[serde(default)]
    pub timestamp: String,
}

/// A control quoted for documentation purposes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRef {
    pub control_id: String,
    pub control_description: String,
}

/// A distinct rule identifier selected for enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub rule_identifier: String,
    /// Sorted and deduplicated.
    pub control_ids: Vec<String>,
    pub representative: ControlRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleParameter {
    pub name: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Structured metadata for one rule, produced by enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub rule_identifier: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
    pub source_owner: String,
    pub source_identifier: String,
}

/// A fixed-size slice of the selected rules, enriched as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Starts at 1, contiguous within a job.
    pub batch_id: u32,
    pub job_id: String,
    pub rules: Vec<RuleRef>,
}

impl Batch {
    pub fn rule_identifiers(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.rule_identifier.as_str())
    }
}

/// Selector output, persisted so the assembler knows what to wait for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub job_id: String,
    /// Store key of the reference corpus shared by every batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_key: Option<String>,
    pub total_rules: usize,
    pub batches: Vec<Batch>,
}

impl BatchPlan {
    pub fn expected_batch_ids(&self) -> Vec<u32> {
        self.batches.iter().map(|b| b.batch_id).collect()
    }

    pub fn batch(&self, batch_id: u32) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }
}

/// Why a single rule could not be enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The service answered that the rule is unknown or not applicable.
    NotRelevant,
    /// The service answered, but not in the required structure.
    ParseError,
    /// Retries exhausted or the service rejected the request.
    ServiceError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRelevant => "not_relevant",
            Self::ParseError => "parse_error",
            Self::ServiceError => "service_error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRule {
    pub rule_identifier: String,
    pub reason: FailureReason,
    #[serde(default)]
    pub detail: String,
}

/// Output of one batch enrichment. Lists every input identifier exactly once
/// across `succeeded` and `failed`, in batch order within each list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: u32,
    pub job_id: String,
    pub succeeded: Vec<RuleDescriptor>,
    pub failed: Vec<FailedRule>,
}

impl BatchResult {
    pub fn processed_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True when `succeeded ∪ failed` is exactly the batch's identifiers.
    pub fn covers(&self, batch: &Batch) -> bool {
        let mut expected: Vec<&str> = batch.rule_identifiers().collect();
        let mut seen: Vec<&str> = self
            .succeeded
            .iter()
            .map(|r| r.rule_identifier.as_str())
            .chain(self.failed.iter().map(|f| f.rule_identifier.as_str()))
            .collect();
        expected.sort_unstable();
        seen.sort_unstable();
        expected == seen
    }
}
