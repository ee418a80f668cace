//! Conformance pack generation engine.
//!
//! Three stages, each consuming the previous one's durable output:
//!
//! 1. [`selector`]: distinct rule identifiers from mapping records, sliced
//!    into deterministic batches ([`model::BatchPlan`]).
//! 2. [`enrich`]: one inference call per rule, one stored
//!    [`model::BatchResult`] per batch.
//! 3. [`assembler`]: merge stored results, bin-pack into bounded
//!    conformance packs, write bundles and the generation report.
//!
//! [`pipeline::JobPipeline`] runs all three for one job.

pub mod assembler;
pub mod config;
pub mod corpus;
pub mod enrich;
pub mod errors;
pub mod mappings;
pub mod model;
pub mod outcome;
pub mod pack;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod selector;

pub use assembler::{merge_results, Assembly, MergedResults, PackAssembler};
pub use config::{GenerationConfig, GenerationConfigOverrides};
pub use corpus::ReferenceCorpus;
pub use enrich::BatchEnricher;
pub use errors::{AssemblyError, BatchError, ConfigError, InferenceError, PipelineError};
pub use model::{
    Batch, BatchPlan, BatchResult, FailedRule, FailureReason, MappingRecord, RuleDescriptor,
    RuleParameter, RuleRef,
};
pub use outcome::{GenerationOutcome, LogNotifier, Notification, Notifier};
pub use pack::{pack_rules, Bundle, PackLimits};
pub use pipeline::{plan_job, JobPipeline, JobRun};
pub use report::{BundleSummary, GenerationReport};
pub use selector::{plan_batches, select_rules, RuleSelection};
