//! Batch Enricher: one [`BatchResult`] per [`Batch`].
//!
//! Each rule identifier is enriched independently. A failing rule is
//! recorded in `failed` and never aborts its siblings; the only batch-level
//! failures are an unavailable corpus, a service that cannot be reached for
//! any rule, and a result that cannot be persisted.

pub mod parse;
pub mod prompt;
mod retry;

use std::sync::Arc;

use conpack_store::bytes::Bytes;
use conpack_store::{ArtifactStore, StoreError};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::corpus::ReferenceCorpus;
use crate::errors::BatchError;
use crate::model::{Batch, BatchResult, FailedRule, FailureReason, RuleDescriptor, RuleRef};
use crate::providers::InferenceClient;

pub use parse::parse_answer;
pub use retry::{complete_with_retry, RetryPolicy};

enum RuleOutcome {
    Enriched(RuleDescriptor),
    Failed(FailedRule),
    /// The service could not be contacted for this rule.
    Unreachable(FailedRule),
}

pub struct BatchEnricher {
    client: Arc<dyn InferenceClient>,
    store: Arc<dyn ArtifactStore>,
    config: GenerationConfig,
    policy: RetryPolicy,
}

impl BatchEnricher {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        store: Arc<dyn ArtifactStore>,
        config: GenerationConfig,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            client,
            store,
            config,
            policy,
        }
    }

    /// Enrich `batch` against the corpus stored at `corpus_key` and persist
    /// the result write-once.
    ///
    /// If a result is already stored for the batch it is returned as is and
    /// the service is not called.
    pub async fn enrich(&self, batch: &Batch, corpus_key: &str) -> Result<BatchResult, BatchError> {
        let batch_id = batch.batch_id;
        let key = self.store.keys().batch_result_key(&batch.job_id, batch_id);

        if let Some(existing) = self.load_existing(batch).await? {
            info!(
                job_id = %batch.job_id,
                batch_id,
                "batch result already stored, skipping enrichment"
            );
            return Ok(existing);
        }

        let corpus = ReferenceCorpus::load(self.store.as_ref(), corpus_key)
            .await
            .map_err(|source| BatchError::CorpusUnavailable { batch_id, source })?;
        let excerpt = corpus.excerpt(self.config.max_corpus_bytes);

        info!(
            job_id = %batch.job_id,
            batch_id,
            rules = batch.rules.len(),
            corpus_bytes = excerpt.len(),
            "enriching batch"
        );

        // owned items keep the returned future spawnable
        let mut outcomes: Vec<(usize, RuleOutcome)> =
            stream::iter(batch.rules.iter().cloned().enumerate())
                .map(|(idx, rule)| async move { (idx, self.enrich_rule(&rule, excerpt).await) })
                .buffer_unordered(self.config.max_concurrent_rules_per_batch.max(1))
                .collect()
                .await;
        // completion order is arbitrary; results keep batch order
        outcomes.sort_by_key(|(idx, _)| *idx);

        let unreachable = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RuleOutcome::Unreachable(_)))
            .count();
        if !outcomes.is_empty() && unreachable == outcomes.len() {
            let message = match &outcomes[0].1 {
                RuleOutcome::Unreachable(f) => f.detail.clone(),
                _ => String::new(),
            };
            return Err(BatchError::ServiceUnreachable { batch_id, message });
        }

        let mut result = BatchResult {
            batch_id,
            job_id: batch.job_id.clone(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (_, outcome) in outcomes {
            match outcome {
                RuleOutcome::Enriched(rule) => result.succeeded.push(rule),
                RuleOutcome::Failed(f) | RuleOutcome::Unreachable(f) => result.failed.push(f),
            }
        }

        let body = serde_json::to_vec_pretty(&result).map_err(|e| BatchError::Persist {
            batch_id,
            source: StoreError::Other(e.into()),
        })?;

        match self.store.put_create(&key, Bytes::from(body)).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                // another run finished the same batch first; its result stands
                warn!(job_id = %batch.job_id, batch_id, "batch result written concurrently, keeping stored copy");
                if let Some(existing) = self.load_existing(batch).await? {
                    return Ok(existing);
                }
            }
            Err(source) => return Err(BatchError::Persist { batch_id, source }),
        }

        info!(
            job_id = %batch.job_id,
            batch_id,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            key = %key,
            "stored batch result"
        );
        Ok(result)
    }

    /// Stored result for `batch`, if any.
    pub async fn load_existing(&self, batch: &Batch) -> Result<Option<BatchResult>, BatchError> {
        let batch_id = batch.batch_id;
        let key = self.store.keys().batch_result_key(&batch.job_id, batch_id);
        let bytes = match self.store.get(&key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(source) => return Err(BatchError::Persist { batch_id, source }),
        };
        let result: BatchResult =
            serde_json::from_slice(&bytes).map_err(|e| BatchError::Persist {
                batch_id,
                source: StoreError::Other(
                    anyhow::Error::new(e).context(format!("stored result {key} is unreadable")),
                ),
            })?;
        Ok(Some(result))
    }

    async fn enrich_rule(&self, rule: &RuleRef, corpus_excerpt: &str) -> RuleOutcome {
        let id = rule.rule_identifier.as_str();
        let request = prompt::build_request(rule, corpus_excerpt, &self.config);

        let response =
            match complete_with_retry(self.client.as_ref(), &request, &self.policy).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(rule_identifier = id, error = %e, "enrichment call failed");
                    let failed = FailedRule {
                        rule_identifier: id.to_string(),
                        reason: FailureReason::ServiceError,
                        detail: e.to_string(),
                    };
                    return if e.is_unreachable() {
                        RuleOutcome::Unreachable(failed)
                    } else {
                        RuleOutcome::Failed(failed)
                    };
                }
            };

        match parse_answer(id, &response.text) {
            Ok(descriptor) => {
                debug!(
                    rule_identifier = id,
                    display_name = %descriptor.display_name,
                    parameters = descriptor.parameters.len(),
                    "enriched rule"
                );
                RuleOutcome::Enriched(descriptor)
            }
            Err(failed) => {
                warn!(
                    rule_identifier = id,
                    reason = %failed.reason,
                    detail = %failed.detail,
                    "rule not enriched"
                );
                RuleOutcome::Failed(failed)
            }
        }
    }
}
