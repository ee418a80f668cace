//! End-to-end job runs: select, enrich, assemble, notify.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{fast_config, mapping, shared, ScriptedClient};
use conpack_core::mappings::MemoryMappings;
use conpack_core::providers::{InferenceClient, InferenceRequest, InferenceResponse};
use conpack_core::{
    BatchError, GenerationConfig, GenerationOutcome, InferenceError, JobPipeline, Notification,
    Notifier, PipelineError, ReferenceCorpus,
};
use conpack_store::bytes::Bytes;
use conpack_store::{ArtifactStore, KeyBuilder, ObjectEntry, ObjectKey, ObjectStoreArtifactStore, StoreError, StoreResult};

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Notification>>);

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, _job_id: &str, notification: &Notification) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn mappings(job: &str, rules: usize) -> MemoryMappings {
    let mut records = Vec::new();
    for i in 0..rules {
        // every rule is referenced by two controls; rows arrive unsorted
        records.push(mapping(job, &format!("ISM-{:04}", 1000 - i), &common::rule_id(rules - 1 - i)));
        records.push(mapping(job, &format!("ISM-{:04}", i), &common::rule_id(rules - 1 - i)));
    }
    records.push(mapping("other-job", "ISM-9999", "foreign-rule"));
    MemoryMappings::new(records)
}

fn corpus() -> ReferenceCorpus {
    ReferenceCorpus::new("<html>managed rules</html>")
}

#[tokio::test]
async fn test_full_run_generates_packs_for_every_rule() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let client = shared(ScriptedClient::answering());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = GenerationConfig {
        batch_size: 7,
        max_concurrent_batches: 3,
        ..fast_config()
    };
    let pipeline = JobPipeline::new(Arc::new(mappings("job-1", 30)), store.clone(), client.clone(), config)
        .with_notifier(notifier.clone());

    let run = pipeline.run("job-1", &corpus()).await.unwrap();

    assert_eq!(run.plan.total_rules, 30);
    assert_eq!(run.plan.batches.len(), 5);
    assert!(run.batch_errors.is_empty());
    assert_eq!(client.call_count(), 30);
    assert!(!client.seen.lock().unwrap().iter().any(|id| id == "foreign-rule"));

    let report = &run.assembly.report;
    assert_eq!(report.succeeded, 30);
    assert!(report.failed.is_empty());
    assert_eq!(report.outcome, GenerationOutcome::Generated { bundles: 1 });

    let notes = notifier.0.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].subject.starts_with("Conformance packs generated"));

    assert!(store
        .exists(&store.keys().plan_key("job-1"))
        .await
        .unwrap());
    assert!(store
        .exists(&store.keys().corpus_key("job-1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rerun_reuses_stored_results() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let client = shared(ScriptedClient::answering().not_applicable(&["rule-004"]));
    let pipeline = JobPipeline::new(
        Arc::new(mappings("job-2", 12)),
        store.clone(),
        client.clone(),
        GenerationConfig {
            batch_size: 5,
            ..fast_config()
        },
    );

    let first = pipeline.run("job-2", &corpus()).await.unwrap();
    let second = pipeline.run("job-2", &corpus()).await.unwrap();

    assert_eq!(client.call_count(), 12);
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.assembly.bundles, second.assembly.bundles);
    assert!(matches!(
        second.assembly.report.outcome,
        GenerationOutcome::PartiallyGenerated { failed_rules: 1, .. }
    ));
}

#[tokio::test]
async fn test_job_without_mappings_is_unavailable() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let client = shared(ScriptedClient::answering());
    let pipeline = JobPipeline::new(Arc::new(mappings("job-x", 3)), store.clone(), client.clone(), fast_config());

    let run = pipeline.run("empty-job", &corpus()).await.unwrap();
    assert_eq!(client.call_count(), 0);
    assert!(run.assembly.bundles.is_empty());
    assert_eq!(
        run.assembly.report.outcome,
        GenerationOutcome::Unavailable {
            reason: "no rule identifiers selected".into()
        }
    );
    assert!(run.notification.subject.contains("unavailable"));
    assert!(!store
        .exists(&store.keys().corpus_key("empty-job"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unreachable_service_reports_missing_batches() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let pipeline = JobPipeline::new(
        Arc::new(mappings("job-3", 6)),
        store,
        shared(ScriptedClient::unreachable()),
        GenerationConfig {
            batch_size: 3,
            ..fast_config()
        },
    );

    let run = pipeline.run("job-3", &corpus()).await.unwrap();
    assert_eq!(run.batch_errors.len(), 2);
    assert!(run
        .batch_errors
        .iter()
        .all(|e| matches!(e, BatchError::ServiceUnreachable { .. })));
    assert_eq!(run.assembly.report.missing_batches, [1, 2]);
    assert!(matches!(
        run.assembly.report.outcome,
        GenerationOutcome::Unavailable { .. }
    ));
}

#[tokio::test]
async fn test_changed_mappings_conflict_with_stored_plan() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let client = shared(ScriptedClient::answering());

    JobPipeline::new(Arc::new(mappings("job-4", 4)), store.clone(), client.clone(), fast_config())
        .plan("job-4", &corpus())
        .await
        .unwrap();

    let err = JobPipeline::new(Arc::new(mappings("job-4", 5)), store, client, fast_config())
        .plan("job-4", &corpus())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PlanMismatch { .. }));
}

/// Never answers until cancelled.
struct Stalled;

#[async_trait]
impl InferenceClient for Stalled {
    async fn complete(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(InferenceError::Timeout(Duration::from_secs(3600)))
    }

    fn provider_name(&self) -> &'static str {
        "stalled"
    }
}

#[tokio::test]
async fn test_cancellation_abandons_batches_and_still_assembles() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let config = GenerationConfig {
        batch_size: 2,
        max_concurrent_batches: 1,
        enrichment_timeout: Duration::from_secs(600),
        batch_timeout: Duration::from_secs(1200),
        assembly_wait: Duration::ZERO,
        ..fast_config()
    };
    let pipeline = JobPipeline::new(Arc::new(mappings("job-5", 4)), store, Arc::new(Stalled), config);

    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });

    let run = tokio::time::timeout(
        Duration::from_secs(10),
        pipeline.run_with_cancel("job-5", &corpus(), rx),
    )
    .await
    .expect("cancellation must stop the run")
    .unwrap();

    assert_eq!(run.batch_errors.len(), 2);
    assert!(run
        .batch_errors
        .iter()
        .all(|e| matches!(e, BatchError::Cancelled { .. })));
    assert_eq!(run.assembly.report.missing_batches, [1, 2]);
    assert!(run.notification.subject.contains("unavailable"));
}

#[tokio::test]
async fn test_more_batches_than_concurrency_slots() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let client = shared(ScriptedClient::answering());
    let config = GenerationConfig {
        batch_size: 2,
        max_concurrent_batches: 2,
        ..fast_config()
    };
    let pipeline = JobPipeline::new(Arc::new(mappings("job-6", 11)), store, client.clone(), config);

    let (plan, _) = pipeline.plan("job-6", &corpus()).await.unwrap();
    assert_eq!(plan.batches.len(), 6);

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let (results, errors) = pipeline.enrich_all(&plan, rx).await;
    assert!(errors.is_empty());
    let ids: Vec<u32> = results.iter().map(|r| r.batch_id).collect();
    assert_eq!(ids, [1, 2, 3, 4, 5, 6]);
    assert_eq!(client.call_count(), 11);
}

/// Memory store whose overwrites fail, as on a full disk.
struct FullDisk(ObjectStoreArtifactStore);

#[async_trait]
impl ArtifactStore for FullDisk {
    fn keys(&self) -> &KeyBuilder {
        self.0.keys()
    }

    async fn put_create(&self, key: &ObjectKey, bytes: Bytes) -> StoreResult<()> {
        self.0.put_create(key, bytes).await
    }

    async fn put_overwrite(&self, _key: &ObjectKey, _bytes: Bytes) -> StoreResult<()> {
        Err(StoreError::Io {
            message: "disk full".into(),
        })
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.0.get(key).await
    }

    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.0.exists(key).await
    }

    async fn list(&self, prefix: &ObjectKey) -> StoreResult<Vec<ObjectEntry>> {
        self.0.list(prefix).await
    }
}

#[tokio::test]
async fn test_assembly_failure_still_notifies_unavailable() {
    let store = Arc::new(FullDisk(ObjectStoreArtifactStore::memory()));
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = JobPipeline::new(
        Arc::new(mappings("job-7", 3)),
        store,
        shared(ScriptedClient::answering()),
        fast_config(),
    )
    .with_notifier(notifier.clone());

    let err = pipeline.run("job-7", &corpus()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Assembly(conpack_core::AssemblyError::WriteArtifact { .. })
    ));
    assert!(err.is_unavailable());

    let notes = notifier.0.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].subject.contains("unavailable"));
    assert!(notes[0].message.contains("disk full"));
}

#[tokio::test]
async fn test_failed_batches_are_not_waited_for() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let config = GenerationConfig {
        assembly_wait: Duration::from_secs(30),
        ..fast_config()
    };
    let pipeline = JobPipeline::new(
        Arc::new(mappings("job-8", 2)),
        store,
        shared(ScriptedClient::unreachable()),
        config,
    );

    let started = std::time::Instant::now();
    let run = pipeline.run("job-8", &corpus()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(run.batch_errors.len(), 1);
    assert_eq!(run.assembly.report.missing_batches, [1]);
}

/// Panics on one rule, answers the rest.
struct PanicsOn(&'static str, ScriptedClient);

#[async_trait]
impl InferenceClient for PanicsOn {
    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        if request.rule_identifier == self.0 {
            panic!("client bug on {}", self.0);
        }
        self.1.complete(request).await
    }

    fn provider_name(&self) -> &'static str {
        "panics-on"
    }
}

#[tokio::test]
async fn test_panicked_batch_is_reported_as_batch_error() {
    let store = Arc::new(ObjectStoreArtifactStore::memory());
    let config = GenerationConfig {
        batch_size: 2,
        ..fast_config()
    };
    let pipeline = JobPipeline::new(
        Arc::new(mappings("job-9", 4)),
        store,
        Arc::new(PanicsOn("rule-000", ScriptedClient::answering())),
        config,
    );

    let run = pipeline.run("job-9", &corpus()).await.unwrap();
    assert_eq!(run.batch_errors.len(), 1);
    assert!(matches!(
        run.batch_errors[0],
        BatchError::Aborted { batch_id: 1, .. }
    ));
    assert_eq!(run.assembly.report.missing_batches, [1]);
    assert_eq!(run.assembly.report.succeeded, 2);
}
