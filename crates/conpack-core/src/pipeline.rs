//! Whole-job orchestration: select, plan, enrich batches concurrently,
//! assemble, notify.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use conpack_store::bytes::Bytes;
use conpack_store::ArtifactStore;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::assembler::{Assembly, PackAssembler};
use crate::config::GenerationConfig;
use crate::corpus::ReferenceCorpus;
use crate::enrich::BatchEnricher;
use crate::errors::{BatchError, PipelineError};
use crate::mappings::{JobFilter, MappingSource};
use crate::model::{BatchPlan, BatchResult};
use crate::outcome::{GenerationOutcome, LogNotifier, Notification, Notifier};
use crate::providers::InferenceClient;
use crate::selector::{plan_batches, select_rules, RuleSelection};

/// Result of one job run.
#[derive(Debug)]
pub struct JobRun {
    pub plan: BatchPlan,
    /// Batch-level failures; those batches show up as missing in the report.
    pub batch_errors: Vec<BatchError>,
    pub assembly: Assembly,
    pub notification: Notification,
}

pub struct JobPipeline {
    source: Arc<dyn MappingSource>,
    store: Arc<dyn ArtifactStore>,
    enricher: Arc<BatchEnricher>,
    notifier: Arc<dyn Notifier>,
    config: GenerationConfig,
}

impl JobPipeline {
    pub fn new(
        source: Arc<dyn MappingSource>,
        store: Arc<dyn ArtifactStore>,
        client: Arc<dyn InferenceClient>,
        config: GenerationConfig,
    ) -> Self {
        let enricher = Arc::new(BatchEnricher::new(client, store.clone(), config.clone()));
        Self {
            source,
            store,
            enricher,
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn enricher(&self) -> &BatchEnricher {
        &self.enricher
    }

    /// Select rules for `job_id`, store the corpus and the batch plan.
    pub async fn plan(
        &self,
        job_id: &str,
        corpus: &ReferenceCorpus,
    ) -> Result<(BatchPlan, RuleSelection), PipelineError> {
        plan_job(
            self.source.as_ref(),
            self.store.as_ref(),
            &self.config,
            job_id,
            corpus,
        )
        .await
    }

    /// Enrich every batch of `plan`, at most `max_concurrent_batches` at a
    /// time, each bounded by `batch_timeout`. Returns stored results and
    /// batch-level failures, both sorted by batch id.
    pub async fn enrich_all(
        &self,
        plan: &BatchPlan,
        cancel: watch::Receiver<bool>,
    ) -> (Vec<BatchResult>, Vec<BatchError>) {
        let Some(corpus_key) = plan.corpus_key.clone() else {
            return (Vec::new(), Vec::new());
        };

        let sem = Arc::new(Semaphore::new(self.config.max_concurrent_batches.max(1)));
        let mut join_set = JoinSet::new();
        let mut task_batches = HashMap::new();
        let mut errors = Vec::new();
        let batch_timeout = self.config.batch_timeout;

        for batch in &plan.batches {
            let mut waiting = cancel.clone();
            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut waiting) => None,
                permit = sem.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                errors.push(BatchError::Cancelled {
                    batch_id: batch.batch_id,
                });
                continue;
            };

            let enricher = self.enricher.clone();
            let batch = batch.clone();
            let corpus_key = corpus_key.clone();
            let mut cancel = cancel.clone();
            let batch_id = batch.batch_id;
            let handle = join_set.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel) => Err(BatchError::Cancelled { batch_id }),
                    res = tokio::time::timeout(batch_timeout, enricher.enrich(&batch, &corpus_key)) => {
                        res.unwrap_or(Err(BatchError::TimedOut { batch_id, timeout: batch_timeout }))
                    }
                }
            });
            task_batches.insert(handle.id(), batch_id);
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let err = match joined {
                Ok(Ok(result)) => {
                    results.push(result);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => match task_batches.get(&e.id()) {
                    Some(&batch_id) => BatchError::Aborted {
                        batch_id,
                        message: e.to_string(),
                    },
                    None => {
                        warn!(job_id = %plan.job_id, error = %e, "untracked batch task failed");
                        continue;
                    }
                },
            };
            warn!(job_id = %plan.job_id, batch_id = err.batch_id(), error = %err, "batch failed");
            errors.push(err);
        }

        results.sort_by_key(|r| r.batch_id);
        errors.sort_by_key(BatchError::batch_id);
        (results, errors)
    }

    /// Run the whole job without external cancellation.
    pub async fn run(&self, job_id: &str, corpus: &ReferenceCorpus) -> Result<JobRun, PipelineError> {
        let (_tx, rx) = watch::channel(false);
        self.run_with_cancel(job_id, corpus, rx).await
    }

    /// Run the whole job. Sending `true` on `cancel` abandons in-flight
    /// batches; assembly still runs over whatever results were stored.
    ///
    /// Every run that gets past rule selection ends with a notification,
    /// including one that fails before packs are written.
    pub async fn run_with_cancel(
        &self,
        job_id: &str,
        corpus: &ReferenceCorpus,
        cancel: watch::Receiver<bool>,
    ) -> Result<JobRun, PipelineError> {
        match self.run_inner(job_id, corpus, cancel).await {
            Ok(run) => {
                self.notify(job_id, &run.notification).await;
                Ok(run)
            }
            Err(e) => {
                if e.is_unavailable() {
                    let outcome = GenerationOutcome::Unavailable {
                        reason: e.to_string(),
                    };
                    self.notify(job_id, &outcome.notification(job_id)).await;
                }
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        job_id: &str,
        corpus: &ReferenceCorpus,
        cancel: watch::Receiver<bool>,
    ) -> Result<JobRun, PipelineError> {
        let (plan, selection) = self.plan(job_id, corpus).await?;
        let (results, batch_errors) = self.enrich_all(&plan, cancel).await;
        info!(
            job_id,
            completed = results.len(),
            failed = batch_errors.len(),
            "enrichment finished"
        );

        let abandoned: BTreeSet<u32> = batch_errors.iter().map(BatchError::batch_id).collect();
        let assembler = PackAssembler::new(self.store.clone(), self.config.clone());
        let assembly = assembler
            .assemble_settled(&plan, Some(&selection.records), &abandoned)
            .await?;

        let notification = assembly.report.outcome.notification(job_id);
        Ok(JobRun {
            plan,
            batch_errors,
            assembly,
            notification,
        })
    }

    async fn notify(&self, job_id: &str, notification: &Notification) {
        if let Err(e) = self.notifier.notify(job_id, notification).await {
            warn!(job_id, error = %e, "failed to deliver notification");
        }
    }
}

/// Select rules for `job_id`, store the corpus and the batch plan.
///
/// The plan is write-once: re-planning unchanged mapping data finds the
/// identical stored plan and reuses it. A stored plan that differs is an
/// error, since batch results already written may belong to it.
pub async fn plan_job(
    source: &dyn MappingSource,
    store: &dyn ArtifactStore,
    config: &GenerationConfig,
    job_id: &str,
    corpus: &ReferenceCorpus,
) -> Result<(BatchPlan, RuleSelection), PipelineError> {
    config.validate()?;
    let selection = select_rules(source, &JobFilter::Job(job_id.to_string())).await?;

    let corpus_key = if selection.is_empty() {
        None
    } else {
        Some(corpus.persist(store, job_id).await?)
    };
    let plan = plan_batches(job_id, &selection, config.batch_size, corpus_key);

    let key = store.keys().plan_key(job_id);
    let persist_err = |err| PipelineError::PersistPlan {
        key: key.to_string(),
        source: err,
    };
    let body = serde_json::to_vec_pretty(&plan)
        .map_err(|e| persist_err(conpack_store::StoreError::Other(e.into())))?;

    match store.put_create(&key, Bytes::from(body)).await {
        Ok(()) => info!(job_id, key = %key, batches = plan.batches.len(), "stored batch plan"),
        Err(e) if e.is_already_exists() => {
            let stored = store.get(&key).await.map_err(persist_err)?;
            let stored: BatchPlan = serde_json::from_slice(&stored)
                .map_err(|e| persist_err(conpack_store::StoreError::Other(e.into())))?;
            if stored != plan {
                return Err(PipelineError::PlanMismatch {
                    job_id: job_id.to_string(),
                });
            }
            info!(job_id, "batch plan already stored, resuming");
        }
        Err(e) => return Err(persist_err(e)),
    }

    Ok((plan, selection))
}

/// Resolves once `true` is observed; never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
