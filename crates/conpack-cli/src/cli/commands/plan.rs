use anyhow::Context;
use conpack_core::plan_job;

use super::common;
use crate::cli::args::PlanArgs;
use crate::exit_codes;

pub async fn run(args: PlanArgs) -> anyhow::Result<i32> {
    let settings = common::settings(&args.common)?;
    let store = common::open_store(&args.common.store).await?;
    let source = common::open_mappings(&args.mappings)?;
    let corpus = common::load_corpus(&args.corpus).await?;

    let (plan, selection) = plan_job(
        source.as_ref(),
        store.as_ref(),
        &settings.generation,
        &args.common.job,
        &corpus,
    )
    .await
    .with_context(|| format!("failed to plan job {}", args.common.job))?;

    println!(
        "job {}: {} rules from {} mapping records in {} batch(es)",
        plan.job_id,
        plan.total_rules,
        selection.records_scanned(),
        plan.batches.len()
    );
    for batch in &plan.batches {
        println!("  batch {}: {} rules", batch.batch_id, batch.rules.len());
    }
    Ok(exit_codes::SUCCESS)
}
