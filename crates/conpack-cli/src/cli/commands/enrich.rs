use std::sync::Arc;

use anyhow::Context;
use conpack_core::{BatchEnricher, BatchError, PackAssembler};
use tracing::error;

use super::common;
use crate::cli::args::EnrichArgs;
use crate::exit_codes;

/// Enrich a single batch of a stored plan. Meant to be fanned out by the
/// orchestrating workflow, one invocation per batch id.
pub async fn run(args: EnrichArgs) -> anyhow::Result<i32> {
    let settings = common::settings(&args.common)?;
    let store = common::open_store(&args.common.store).await?;
    let job_id = args.common.job.as_str();

    let plan = PackAssembler::new(store.clone(), settings.generation.clone())
        .load_plan(job_id)
        .await
        .with_context(|| format!("no usable batch plan for job {job_id}"))?;
    let batch = plan
        .batch(args.batch)
        .with_context(|| format!("batch {} is not part of the plan for job {job_id}", args.batch))?;
    let corpus_key = plan
        .corpus_key
        .as_deref()
        .with_context(|| format!("plan for job {job_id} has no reference corpus"))?;

    let client = settings.inference.build_client()?;
    let batch_timeout = settings.generation.batch_timeout;
    let enricher = BatchEnricher::new(Arc::new(client), store, settings.generation);

    let outcome = tokio::time::timeout(batch_timeout, enricher.enrich(batch, corpus_key))
        .await
        .unwrap_or(Err(BatchError::TimedOut {
            batch_id: batch.batch_id,
            timeout: batch_timeout,
        }));

    match outcome {
        Ok(result) => {
            println!(
                "batch {}: {} enriched, {} failed",
                result.batch_id,
                result.succeeded.len(),
                result.failed.len()
            );
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            error!(job_id, batch_id = e.batch_id(), error = %e, "batch failed");
            eprintln!("{e}");
            Ok(exit_codes::UNAVAILABLE)
        }
    }
}
