//! Generation report: what was packed, what failed, what never arrived.

mod html;
mod markdown;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::FailedRule;
use crate::outcome::GenerationOutcome;
use crate::pack::Bundle;

pub use html::render_mappings_html;
pub use markdown::render_markdown;

pub const MARKDOWN_REPORT_FILE: &str = "GENERATION_REPORT.md";
pub const JSON_REPORT_FILE: &str = "generation-report.json";
pub const MAPPINGS_REPORT_FILE: &str = "control-mappings-report.html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub name: String,
    pub file_name: String,
    pub key: String,
    pub rule_count: usize,
    pub byte_size: usize,
    pub percent_of_limit: f64,
    pub sha256: String,
    pub oversized: bool,
}

impl BundleSummary {
    pub fn from_bundle(bundle: &Bundle, key: String, max_bytes: usize) -> Self {
        let percent_of_limit = if max_bytes == 0 {
            0.0
        } else {
            bundle.byte_len() as f64 / max_bytes as f64 * 100.0
        };
        Self {
            name: bundle.name.clone(),
            file_name: bundle.file_name(),
            key,
            rule_count: bundle.rules.len(),
            byte_size: bundle.byte_len(),
            percent_of_limit,
            sha256: bundle.digest(),
            oversized: bundle.oversized,
        }
    }
}

/// Derived summary of one assembly run. Not authoritative state: the batch
/// results and bundles it describes are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub job_id: String,
    pub generated_at: DateTime<Utc>,
    pub total_rules: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedRule>,
    pub missing_batches: Vec<u32>,
    /// Rules planned in batches whose results never arrived.
    #[serde(default)]
    pub missing_rules: Vec<String>,
    pub bundles: Vec<BundleSummary>,
    pub max_bundle_bytes: usize,
    pub max_rules_per_bundle: usize,
    pub outcome: GenerationOutcome,
}

impl GenerationReport {
    /// Identifiers to feed into a re-run: failed rules, then rules of
    /// missing batches.
    pub fn rerun_identifiers(&self) -> Vec<&str> {
        self.failed
            .iter()
            .map(|f| f.rule_identifier.as_str())
            .chain(self.missing_rules.iter().map(String::as_str))
            .collect()
    }

    pub fn oversized_bundles(&self) -> impl Iterator<Item = &BundleSummary> {
        self.bundles.iter().filter(|b| b.oversized)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}
