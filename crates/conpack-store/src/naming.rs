//! Key naming conventions for pipeline storage.
//!
//! # Key Schema
//!
//! ```text
//! {base}/conformance-packs/{job_id}/docs/reference-corpus.html
//! {base}/conformance-packs/{job_id}/plan.json
//! {base}/conformance-packs/{job_id}/batch-results/batch-{batch_id:04}.json
//! {base}/conformance-packs/{job_id}/{artifact_file_name}
//! ```
//!
//! Every batch writes to its own key, so concurrent batches never contend.
//! Batch ids are zero-padded so that lexicographic listing order matches
//! numeric order for the first 9999 batches; callers still sort numerically.

use object_store::path::Path;

const ROOT: &str = "conformance-packs";
const BATCH_RESULTS_DIR: &str = "batch-results";
const BATCH_FILE_PREFIX: &str = "batch-";
const BATCH_FILE_SUFFIX: &str = ".json";

/// Builder for storage keys.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    /// Base prefix (e.g., "compliance/prod")
    base_prefix: String,
}

impl KeyBuilder {
    /// Create a new key builder with the given base prefix.
    pub fn new(base_prefix: impl Into<String>) -> Self {
        let prefix = base_prefix.into().trim_matches('/').to_string();
        Self {
            base_prefix: prefix,
        }
    }

    fn job_root(&self, job_id: &str) -> String {
        let job_id = Self::sanitize_id(job_id);
        if self.base_prefix.is_empty() {
            format!("{}/{}", ROOT, job_id)
        } else {
            format!("{}/{}/{}", self.base_prefix, ROOT, job_id)
        }
    }

    /// Key for the job's reference corpus.
    pub fn corpus_key(&self, job_id: &str) -> Path {
        Path::from(format!(
            "{}/docs/reference-corpus.html",
            self.job_root(job_id)
        ))
    }

    /// Key for the persisted batch plan.
    pub fn plan_key(&self, job_id: &str) -> Path {
        Path::from(format!("{}/plan.json", self.job_root(job_id)))
    }

    /// Key for one batch result.
    ///
    /// Returns: `{base}/conformance-packs/{job_id}/batch-results/batch-0001.json`
    pub fn batch_result_key(&self, job_id: &str, batch_id: u32) -> Path {
        Path::from(format!(
            "{}/{}/{}{:04}{}",
            self.job_root(job_id),
            BATCH_RESULTS_DIR,
            BATCH_FILE_PREFIX,
            batch_id,
            BATCH_FILE_SUFFIX
        ))
    }

    /// Prefix for listing all batch results of a job.
    pub fn batch_results_prefix(&self, job_id: &str) -> Path {
        Path::from(format!("{}/{}/", self.job_root(job_id), BATCH_RESULTS_DIR))
    }

    /// Key for a final artifact (bundle file, report) of a job.
    pub fn artifact_key(&self, job_id: &str, file_name: &str) -> Path {
        Path::from(format!(
            "{}/{}",
            self.job_root(job_id),
            Self::sanitize_id(file_name)
        ))
    }

    /// Extract the batch id from a batch result key.
    ///
    /// Input: `.../batch-results/batch-0007.json`
    /// Output: `Some(7)`
    pub fn parse_batch_result_key(&self, key: &Path) -> Option<u32> {
        let key_str = key.as_ref();
        let mut parts = key_str.rsplit('/');
        let file_name = parts.next()?;
        if parts.next()? != BATCH_RESULTS_DIR {
            return None;
        }
        file_name
            .strip_prefix(BATCH_FILE_PREFIX)?
            .strip_suffix(BATCH_FILE_SUFFIX)?
            .parse()
            .ok()
    }

    /// Replace characters that are not safe in object keys.
    fn sanitize_id(id: &str) -> String {
        id.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
