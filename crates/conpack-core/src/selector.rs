//! Rule Selector: distinct rule identifiers from mapping records, sliced into
//! deterministic batches.

use std::collections::BTreeMap;

use tracing::info;

use crate::errors::SelectError;
use crate::mappings::{JobFilter, MappingSource};
use crate::model::{Batch, BatchPlan, ControlRef, MappingRecord, RuleRef};

/// Distinct rules referenced by a job's mappings, sorted by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSelection {
    pub rules: Vec<RuleRef>,
    /// The scanned records, kept for the control-mappings report.
    pub records: Vec<MappingRecord>,
}

impl RuleSelection {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn records_scanned(&self) -> usize {
        self.records.len()
    }
}

/// Read mappings matching `filter` and collapse them to distinct rules.
///
/// A job without mappings yields an empty selection, not an error.
pub async fn select_rules(
    source: &dyn MappingSource,
    filter: &JobFilter,
) -> Result<RuleSelection, SelectError> {
    if let JobFilter::Job(id) = filter {
        if id.trim().is_empty() {
            return Err(SelectError::EmptyJobId);
        }
    }

    let records = source.scan(filter).await?;
    let rules = distinct_rules(&records);

    info!(
        records = records.len(),
        distinct_rules = rules.len(),
        filter = ?filter,
        "selected rule identifiers"
    );

    Ok(RuleSelection { rules, records })
}

/// Collapse records by rule identifier. Output is sorted lexicographically by
/// identifier so that identical mapping data always yields identical batches,
/// whatever order the store returned rows in.
pub fn distinct_rules(records: &[MappingRecord]) -> Vec<RuleRef> {
    // rule -> control_id -> first non-empty description
    let mut by_rule: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();

    for record in records {
        let rule = record.rule_identifier.trim();
        let control = record.control_id.trim();
        if rule.is_empty() || control.is_empty() {
            continue;
        }
        let description = by_rule
            .entry(rule)
            .or_default()
            .entry(control)
            .or_insert("");
        if description.is_empty() {
            *description = record.control_description.as_str();
        }
    }

    by_rule
        .into_iter()
        .filter_map(|(rule, controls)| {
            let (first_id, first_desc) = controls.iter().next().map(|(k, v)| (*k, *v))?;
            Some(RuleRef {
                rule_identifier: rule.to_string(),
                control_ids: controls.keys().map(|c| c.to_string()).collect(),
                representative: ControlRef {
                    control_id: first_id.to_string(),
                    control_description: first_desc.to_string(),
                },
            })
        })
        .collect()
}

/// Slice sorted rules into batches of at most `batch_size`, numbered from 1.
pub fn split_into_batches(job_id: &str, rules: &[RuleRef], batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    rules
        .chunks(batch_size)
        .enumerate()
        .map(|(idx, chunk)| Batch {
            batch_id: idx as u32 + 1,
            job_id: job_id.to_string(),
            rules: chunk.to_vec(),
        })
        .collect()
}

/// Build the persisted plan for a job.
pub fn plan_batches(
    job_id: &str,
    selection: &RuleSelection,
    batch_size: usize,
    corpus_key: Option<String>,
) -> BatchPlan {
    let batches = split_into_batches(job_id, &selection.rules, batch_size);
    info!(
        job_id,
        total_rules = selection.rules.len(),
        total_batches = batches.len(),
        batch_size,
        "planned enrichment batches"
    );
    BatchPlan {
        job_id: job_id.to_string(),
        corpus_key,
        total_rules: selection.rules.len(),
        batches,
    }
}
