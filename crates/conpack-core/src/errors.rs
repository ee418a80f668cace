//! Error types for every pipeline stage.
//!
//! Per-rule enrichment failures are not errors: they are recorded as
//! [`crate::model::FailedRule`] values inside a batch result. The types here
//! cover what a stage cannot recover from locally.

use std::time::Duration;

use conpack_store::StoreError;
use thiserror::Error;

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid config '{field}': {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Mapping store could not be read.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to open mapping source {path}: {message}")]
    Open { path: String, message: String },

    #[error("malformed mapping record at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("mapping query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("job id must be a non-empty string")]
    EmptyJobId,

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Failure of one call to the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("inference service error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("inference service unreachable: {message}")]
    Unreachable { message: String },

    #[error("inference request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid inference response: {message}")]
    InvalidResponse { message: String },
}

impl InferenceError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Unreachable { .. }
        )
    }

    /// The service could not be contacted at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unreachable {
                message: err.to_string(),
            }
        } else if err.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Unreachable {
                message: err.to_string(),
            }
        }
    }
}

/// Reference corpus could not be obtained.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to fetch reference corpus from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to read reference corpus {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reference corpus is not valid UTF-8")]
    Encoding,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Batch-level failure, surfaced to the orchestrating caller.
/// The batch's result is absent from the store afterwards.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch {batch_id}: reference corpus unavailable: {source}")]
    CorpusUnavailable {
        batch_id: u32,
        #[source]
        source: CorpusError,
    },

    #[error("batch {batch_id}: inference service unreachable for every rule ({message})")]
    ServiceUnreachable { batch_id: u32, message: String },

    #[error("batch {batch_id}: failed to persist result: {source}")]
    Persist {
        batch_id: u32,
        #[source]
        source: StoreError,
    },

    #[error("batch {batch_id}: timed out after {timeout:?}")]
    TimedOut { batch_id: u32, timeout: Duration },

    #[error("batch {batch_id}: cancelled")]
    Cancelled { batch_id: u32 },

    #[error("batch {batch_id}: task aborted: {message}")]
    Aborted { batch_id: u32, message: String },
}

impl BatchError {
    pub fn batch_id(&self) -> u32 {
        match self {
            Self::CorpusUnavailable { batch_id, .. }
            | Self::ServiceUnreachable { batch_id, .. }
            | Self::Persist { batch_id, .. }
            | Self::TimedOut { batch_id, .. }
            | Self::Cancelled { batch_id }
            | Self::Aborted { batch_id, .. } => *batch_id,
        }
    }
}

/// Fatal for the pack-generation step of one job, and nothing else.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("batch plan for job {job_id} unavailable: {source}")]
    Plan {
        job_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to list batch results for job {job_id}: {source}")]
    ListResults {
        job_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to read result of batch {batch_id}: {source}")]
    ReadResult {
        batch_id: u32,
        #[source]
        source: StoreError,
    },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to render bundle {name}: {message}")]
    Render { name: String, message: String },

    #[error("failed to write artifact {key}: {source}")]
    WriteArtifact {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl AssemblyError {
    /// Packs could not be generated for a reason other than bad settings.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Failure of a whole-job run before or around assembly.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("failed to persist batch plan {key}: {source}")]
    PersistPlan {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("stored batch plan for job {job_id} differs from the current mapping data")]
    PlanMismatch { job_id: String },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

impl PipelineError {
    /// The job got past rule selection but packs could not be generated.
    /// Config and mapping-source errors are the caller's to fix instead.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Select(_) => false,
            Self::Corpus(_) | Self::PersistPlan { .. } | Self::PlanMismatch { .. } => true,
            Self::Assembly(e) => e.is_unavailable(),
        }
    }
}
