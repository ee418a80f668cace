//! Pack Assembler: merge stored batch results, pack, write artifacts.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use conpack_store::bytes::Bytes;
use conpack_store::{ArtifactStore, ObjectKey};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::errors::AssemblyError;
use crate::model::{Batch, BatchPlan, BatchResult, FailedRule, FailureReason, MappingRecord, RuleDescriptor};
use crate::outcome::GenerationOutcome;
use crate::pack::{pack_rules, Bundle, PackLimits};
use crate::report::{
    render_mappings_html, render_markdown, BundleSummary, GenerationReport, JSON_REPORT_FILE,
    MAPPINGS_REPORT_FILE, MARKDOWN_REPORT_FILE,
};

/// Batch results merged into one deterministic rule sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedResults {
    pub rules: Vec<RuleDescriptor>,
    pub failed: Vec<FailedRule>,
    pub missing_batches: Vec<u32>,
    pub missing_rules: Vec<String>,
}

/// Everything one assembly run produced.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub report: GenerationReport,
    pub bundles: Vec<Bundle>,
    pub report_key: String,
}

pub struct PackAssembler {
    store: Arc<dyn ArtifactStore>,
    config: GenerationConfig,
}

impl PackAssembler {
    pub fn new(store: Arc<dyn ArtifactStore>, config: GenerationConfig) -> Self {
        Self { store, config }
    }

    pub async fn load_plan(&self, job_id: &str) -> Result<BatchPlan, AssemblyError> {
        let key = self.store.keys().plan_key(job_id);
        let bytes = self
            .store
            .get(&key)
            .await
            .map_err(|source| AssemblyError::Plan {
                job_id: job_id.to_string(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| AssemblyError::Decode {
            what: key.to_string(),
            source,
        })
    }

    /// Load the job's plan from the store and assemble it.
    pub async fn assemble(
        &self,
        job_id: &str,
        mappings: Option<&[MappingRecord]>,
    ) -> Result<Assembly, AssemblyError> {
        let plan = self.load_plan(job_id).await?;
        self.assemble_plan(&plan, mappings).await
    }

    /// Wait for the plan's batch results, merge, pack, and write every
    /// artifact. Missing results are reported, not fatal.
    pub async fn assemble_plan(
        &self,
        plan: &BatchPlan,
        mappings: Option<&[MappingRecord]>,
    ) -> Result<Assembly, AssemblyError> {
        self.assemble_settled(plan, mappings, &BTreeSet::new()).await
    }

    /// Like [`Self::assemble_plan`], but batches in `abandoned` are known to
    /// have failed and are not waited for. Their results are still used if
    /// one is stored.
    pub async fn assemble_settled(
        &self,
        plan: &BatchPlan,
        mappings: Option<&[MappingRecord]>,
        abandoned: &BTreeSet<u32>,
    ) -> Result<Assembly, AssemblyError> {
        self.config.validate()?;
        let job_id = plan.job_id.as_str();

        let present = self.wait_for_results(plan, abandoned).await?;
        let mut results = BTreeMap::new();
        for batch_id in present {
            results.insert(batch_id, self.read_result(job_id, batch_id).await?);
        }

        let merged = merge_results(plan, &results);
        let limits = PackLimits::from_config(&self.config);
        let bundles = pack_rules(&merged.rules, &self.config.pack_prefix, limits)?;

        let mut summaries = Vec::with_capacity(bundles.len());
        for bundle in &bundles {
            let key = self.store.keys().artifact_key(job_id, &bundle.file_name());
            self.write(&key, bundle.serialized.clone().into_bytes()).await?;
            info!(
                job_id,
                bundle = %bundle.name,
                rules = bundle.rules.len(),
                bytes = bundle.byte_len(),
                oversized = bundle.oversized,
                "wrote conformance pack"
            );
            summaries.push(BundleSummary::from_bundle(
                bundle,
                key.to_string(),
                limits.max_bytes,
            ));
        }

        let outcome = GenerationOutcome::classify(
            plan.total_rules,
            merged.rules.len(),
            merged.failed.len(),
            &merged.missing_batches,
            bundles.len(),
        );
        let report = GenerationReport {
            job_id: job_id.to_string(),
            generated_at: Utc::now(),
            total_rules: plan.total_rules,
            succeeded: merged.rules.len(),
            failed: merged.failed,
            missing_batches: merged.missing_batches,
            missing_rules: merged.missing_rules,
            bundles: summaries,
            max_bundle_bytes: limits.max_bytes,
            max_rules_per_bundle: limits.max_rules,
            outcome,
        };

        let report_key = self.store.keys().artifact_key(job_id, MARKDOWN_REPORT_FILE);
        self.write(&report_key, render_markdown(&report).into_bytes())
            .await?;

        let json_key = self.store.keys().artifact_key(job_id, JSON_REPORT_FILE);
        let json = report.to_json().map_err(|source| AssemblyError::Decode {
            what: json_key.to_string(),
            source,
        })?;
        self.write(&json_key, json).await?;

        if let Some(records) = mappings {
            let html_key = self.store.keys().artifact_key(job_id, MAPPINGS_REPORT_FILE);
            self.write(&html_key, render_mappings_html(job_id, records).into_bytes())
                .await?;
        }

        info!(
            job_id,
            bundles = bundles.len(),
            succeeded = report.succeeded,
            failed = report.failed.len(),
            missing_batches = ?report.missing_batches,
            "assembled conformance packs"
        );

        Ok(Assembly {
            report,
            bundles,
            report_key: report_key.to_string(),
        })
    }

    /// Poll until every expected batch result exists or `assembly_wait`
    /// elapses. Batches in `abandoned` are never waited for. Returns the
    /// expected batch ids that are present.
    pub async fn wait_for_results(
        &self,
        plan: &BatchPlan,
        abandoned: &BTreeSet<u32>,
    ) -> Result<Vec<u32>, AssemblyError> {
        let expected: BTreeSet<u32> = plan.expected_batch_ids().into_iter().collect();
        if expected.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();

        loop {
            let found = self.list_result_ids(&plan.job_id).await?;
            let present: Vec<u32> = expected.intersection(&found).copied().collect();
            let pending = expected
                .iter()
                .filter(|id| !found.contains(id) && !abandoned.contains(id))
                .count();

            if pending == 0 || started.elapsed() >= self.config.assembly_wait {
                let unplanned: Vec<u32> = found.difference(&expected).copied().collect();
                if !unplanned.is_empty() {
                    warn!(job_id = %plan.job_id, batches = ?unplanned, "ignoring results of batches outside the plan");
                }
                if present.len() < expected.len() {
                    warn!(
                        job_id = %plan.job_id,
                        present = present.len(),
                        expected = expected.len(),
                        waited_ms = started.elapsed().as_millis(),
                        "assembly wait elapsed with batch results missing"
                    );
                }
                return Ok(present);
            }

            debug!(
                job_id = %plan.job_id,
                present = present.len(),
                expected = expected.len(),
                "waiting for batch results"
            );
            tokio::time::sleep(self.config.assembly_poll_interval).await;
        }
    }

    async fn list_result_ids(&self, job_id: &str) -> Result<BTreeSet<u32>, AssemblyError> {
        let prefix = self.store.keys().batch_results_prefix(job_id);
        let entries = self
            .store
            .list(&prefix)
            .await
            .map_err(|source| AssemblyError::ListResults {
                job_id: job_id.to_string(),
                source,
            })?;
        Ok(entries
            .iter()
            .filter_map(|entry| self.store.keys().parse_batch_result_key(&entry.key))
            .collect())
    }

    async fn read_result(&self, job_id: &str, batch_id: u32) -> Result<BatchResult, AssemblyError> {
        let key = self.store.keys().batch_result_key(job_id, batch_id);
        let bytes = self
            .store
            .get(&key)
            .await
            .map_err(|source| AssemblyError::ReadResult { batch_id, source })?;
        serde_json::from_slice(&bytes).map_err(|source| AssemblyError::Decode {
            what: key.to_string(),
            source,
        })
    }

    async fn write(&self, key: &ObjectKey, body: Vec<u8>) -> Result<(), AssemblyError> {
        self.store
            .put_overwrite(key, Bytes::from(body))
            .await
            .map_err(|source| AssemblyError::WriteArtifact {
                key: key.to_string(),
                source,
            })
    }
}

/// Merge results by ascending batch id and, within a batch, by the batch's
/// planned rule order. Arrival order never matters.
pub fn merge_results(plan: &BatchPlan, results: &BTreeMap<u32, BatchResult>) -> MergedResults {
    let mut merged = MergedResults::default();
    let mut seen: HashSet<String> = HashSet::new();

    let mut batches: Vec<&Batch> = plan.batches.iter().collect();
    batches.sort_by_key(|b| b.batch_id);

    for batch in batches {
        let Some(result) = results.get(&batch.batch_id) else {
            merged.missing_batches.push(batch.batch_id);
            merged
                .missing_rules
                .extend(batch.rule_identifiers().map(str::to_string));
            continue;
        };

        let position: HashMap<&str, usize> = batch
            .rule_identifiers()
            .enumerate()
            .map(|(idx, id)| (id, idx))
            .collect();
        let planned = |id: &str| {
            let known = position.contains_key(id);
            if !known {
                warn!(rule_identifier = id, batch_id = batch.batch_id, "ignoring rule not planned for this batch");
            }
            known
        };

        let mut succeeded: Vec<&RuleDescriptor> = result
            .succeeded
            .iter()
            .filter(|r| planned(r.rule_identifier.as_str()))
            .collect();
        succeeded.sort_by_key(|r| position[r.rule_identifier.as_str()]);
        let mut failed: Vec<&FailedRule> = result
            .failed
            .iter()
            .filter(|f| planned(f.rule_identifier.as_str()))
            .collect();
        failed.sort_by_key(|f| position[f.rule_identifier.as_str()]);

        for rule in succeeded {
            if seen.insert(rule.rule_identifier.clone()) {
                merged.rules.push(rule.clone());
            } else {
                warn!(rule_identifier = %rule.rule_identifier, batch_id = batch.batch_id, "duplicate rule in batch results, keeping first");
            }
        }
        for failure in failed {
            if seen.insert(failure.rule_identifier.clone()) {
                merged.failed.push(failure.clone());
            }
        }

        // a stored result that does not cover its batch must not hide rules
        for id in batch.rule_identifiers() {
            if !seen.contains(id) {
                warn!(rule_identifier = id, batch_id = batch.batch_id, "rule absent from batch result");
                seen.insert(id.to_string());
                merged.failed.push(FailedRule {
                    rule_identifier: id.to_string(),
                    reason: FailureReason::ServiceError,
                    detail: format!("absent from result of batch {}", batch.batch_id),
                });
            }
        }
    }
    merged
}
