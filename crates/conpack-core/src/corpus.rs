//! Reference documentation shared by every enrichment call of a job.
//!
//! The corpus is fetched once, persisted once under the job prefix, and
//! passed to batch enrichers by key so it is never embedded per request in
//! the orchestration payload.

use std::path::Path;
use std::time::Duration;

use conpack_store::bytes::Bytes;
use conpack_store::{ArtifactStore, ObjectKey};
use tracing::{debug, info};

use crate::errors::CorpusError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCorpus {
    text: String,
}

impl ReferenceCorpus {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// GET the corpus over HTTP(S).
    pub async fn fetch(
        client: &reqwest::Client,
        url: &str,
        timeout: Duration,
    ) -> Result<Self, CorpusError> {
        let fetch_err = |message: String| CorpusError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("status {}", status.as_u16())));
        }

        let text = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
        info!(url, bytes = text.len(), "fetched reference corpus");
        Ok(Self { text })
    }

    pub async fn from_file(path: &Path) -> Result<Self, CorpusError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CorpusError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { text })
    }

    /// Store the corpus under the job prefix and return its key.
    ///
    /// Write-once: if a corpus is already stored for the job, that copy is
    /// kept so re-runs enrich against the same documentation.
    pub async fn persist(
        &self,
        store: &dyn ArtifactStore,
        job_id: &str,
    ) -> Result<String, CorpusError> {
        let key = store.keys().corpus_key(job_id);
        match store
            .put_create(&key, Bytes::from(self.text.clone().into_bytes()))
            .await
        {
            Ok(()) => info!(job_id, key = %key, "stored reference corpus"),
            Err(e) if e.is_already_exists() => {
                debug!(job_id, key = %key, "reference corpus already stored, keeping existing copy");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(key.to_string())
    }

    pub async fn load(store: &dyn ArtifactStore, key: &str) -> Result<Self, CorpusError> {
        let bytes = store.get(&ObjectKey::from(key)).await?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| CorpusError::Encoding)?;
        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// At most `max_bytes` of the corpus, cut on a char boundary.
    pub fn excerpt(&self, max_bytes: usize) -> &str {
        if self.text.len() <= max_bytes {
            return &self.text;
        }
        let mut end = max_bytes;
        while !self.text.is_char_boundary(end) {
            end -= 1;
        }
        &self.text[..end]
    }
}
