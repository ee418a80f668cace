use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use conpack_core::GenerationConfigOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "conpack",
    version,
    about = "Generate deployable AWS Config conformance packs from control-to-rule mappings"
)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Select rules for a job, store the reference corpus and the batch plan
    Plan(PlanArgs),
    /// Enrich one planned batch and store its result
    Enrich(EnrichArgs),
    /// Merge stored batch results into conformance packs and reports
    Assemble(AssembleArgs),
    /// Plan, enrich every batch, and assemble in one process
    Run(RunArgs),
}

/// Options every command shares.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Artifact store URL (s3://bucket/prefix, file:///path, memory://)
    #[arg(long, env = "CONPACK_STORE")]
    pub store: String,

    /// Job identifier
    #[arg(long)]
    pub job: String,

    /// YAML config file with `generation:` and `inference:` sections
    #[arg(long, env = "CONPACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Generation limits settable from the command line; these win over the
/// config file and the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct LimitArgs {
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub max_bundle_bytes: Option<usize>,

    #[arg(long)]
    pub max_rules_per_bundle: Option<usize>,

    #[arg(long)]
    pub max_concurrent_batches: Option<usize>,

    #[arg(long)]
    pub enrichment_timeout_secs: Option<u64>,

    #[arg(long)]
    pub batch_timeout_secs: Option<u64>,

    #[arg(long)]
    pub assembly_wait_secs: Option<u64>,

    /// Pack name prefix; packs are named `{prefix}-01`, `{prefix}-02`, ...
    #[arg(long)]
    pub pack_prefix: Option<String>,
}

impl LimitArgs {
    pub fn overrides(&self) -> GenerationConfigOverrides {
        GenerationConfigOverrides {
            batch_size: self.batch_size,
            max_bundle_bytes: self.max_bundle_bytes,
            max_rules_per_bundle: self.max_rules_per_bundle,
            max_concurrent_batches: self.max_concurrent_batches,
            enrichment_timeout_secs: self.enrichment_timeout_secs,
            batch_timeout_secs: self.batch_timeout_secs,
            assembly_wait_secs: self.assembly_wait_secs,
            pack_prefix: self.pack_prefix.clone(),
            ..GenerationConfigOverrides::default()
        }
    }
}

/// Where the reference corpus comes from.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct CorpusArgs {
    /// Fetch the reference corpus over HTTP(S)
    #[arg(long)]
    pub corpus_url: Option<String>,

    /// Read the reference corpus from a local file
    #[arg(long)]
    pub corpus_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Mapping records: NDJSON file, or SQLite database (.db, .sqlite, .sqlite3)
    #[arg(long, env = "CONPACK_MAPPINGS")]
    pub mappings: PathBuf,

    #[command(flatten)]
    pub corpus: CorpusArgs,
}

#[derive(Args, Debug)]
pub struct EnrichArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Batch id from the stored plan (starting at 1)
    #[arg(long)]
    pub batch: u32,
}

#[derive(Args, Debug)]
pub struct AssembleArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Mapping records for the HTML control-mappings report (skipped if absent)
    #[arg(long, env = "CONPACK_MAPPINGS")]
    pub mappings: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Mapping records: NDJSON file, or SQLite database (.db, .sqlite, .sqlite3)
    #[arg(long, env = "CONPACK_MAPPINGS")]
    pub mappings: PathBuf,

    #[command(flatten)]
    pub corpus: CorpusArgs,
}
