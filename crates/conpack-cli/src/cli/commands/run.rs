use std::sync::Arc;

use conpack_core::JobPipeline;
use tokio::sync::watch;
use tracing::{error, warn};

use super::common;
use crate::cli::args::RunArgs;
use crate::exit_codes;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let settings = common::settings(&args.common)?;
    let store = common::open_store(&args.common.store).await?;
    let source = common::open_mappings(&args.mappings)?;
    let corpus = common::load_corpus(&args.corpus).await?;
    let client = settings.inference.build_client()?;
    let job_id = args.common.job.as_str();

    let pipeline = JobPipeline::new(source, store, Arc::new(client), settings.generation);

    // Ctrl-C abandons in-flight batches; whatever was stored is still assembled.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight batches");
            let _ = cancel_tx.send(true);
        }
    });

    let job = match pipeline.run_with_cancel(job_id, &corpus, cancel_rx).await {
        Ok(job) => job,
        Err(e) if e.is_unavailable() => {
            error!(job_id, error = %e, "conformance pack generation unavailable");
            eprintln!("conformance pack generation unavailable for job {job_id}: {e}");
            return Ok(exit_codes::UNAVAILABLE);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("conformance pack generation failed for job {job_id}")))
        }
    };

    for err in &job.batch_errors {
        eprintln!("{err}");
    }
    common::print_assembly(&job.assembly);
    println!("{}", job.notification.subject);
    Ok(exit_codes::for_outcome(&job.assembly.report.outcome))
}
