use anyhow::Context;
use conpack_core::mappings::JobFilter;
use conpack_core::{select_rules, PackAssembler};
use tracing::error;

use super::common;
use crate::cli::args::AssembleArgs;
use crate::exit_codes;

pub async fn run(args: AssembleArgs) -> anyhow::Result<i32> {
    let settings = common::settings(&args.common)?;
    let store = common::open_store(&args.common.store).await?;
    let job_id = args.common.job.as_str();

    let records = match &args.mappings {
        Some(path) => {
            let source = common::open_mappings(path)?;
            let selection = select_rules(source.as_ref(), &JobFilter::Job(job_id.to_string()))
                .await
                .with_context(|| format!("failed to read mappings from {}", path.display()))?;
            Some(selection.records)
        }
        None => None,
    };

    let assembly = match PackAssembler::new(store, settings.generation)
        .assemble(job_id, records.as_deref())
        .await
    {
        Ok(assembly) => assembly,
        Err(e) if e.is_unavailable() => {
            error!(job_id, error = %e, "conformance pack assembly failed");
            eprintln!("failed to assemble conformance packs for job {job_id}: {e}");
            return Ok(exit_codes::UNAVAILABLE);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to assemble conformance packs for job {job_id}")))
        }
    };

    common::print_assembly(&assembly);
    Ok(exit_codes::for_outcome(&assembly.report.outcome))
}
