//! Durable storage for the conformance pack pipeline.
//!
//! Batch enrichers hand their results to the assembler through this store
//! rather than through the orchestration transport: results are written
//! once under a job-scoped key and discovered later by prefix listing.
//! Final artifacts (bundle files, reports) land under the same job prefix.
//!
//! # Write modes
//!
//! - [`ArtifactStore::put_create`]: write-once objects (batch results, corpus,
//!   plan). Fails with [`StoreError::AlreadyExists`] instead of overwriting.
//! - [`ArtifactStore::put_overwrite`]: regenerated artifacts (bundles,
//!   reports) that a re-run may legitimately replace.

pub mod error;
pub mod naming;
pub mod object_store_backend;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{StoreError, StoreResult};
pub use naming::KeyBuilder;
pub use object_store::path::Path as ObjectKey;
pub use object_store_backend::ObjectStoreArtifactStore;

// Re-export bytes for callers
pub use bytes;

/// Where artifacts live, parsed from a store URL.
///
/// ```text
/// s3://my-bucket/compliance?region=ap-southeast-2
/// file:///var/lib/conpack
/// memory://            (one process only)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSpec {
    Memory {
        prefix: String,
    },
    File {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        prefix: String,
        region: Option<String>,
    },
}

impl StoreSpec {
    pub fn parse(url: &str) -> StoreResult<Self> {
        let invalid = |reason: String| StoreError::InvalidSpec {
            spec: url.to_string(),
            reason,
        };
        let parsed = url::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let path = parsed.path().trim_matches('/').to_string();

        match parsed.scheme() {
            "memory" => Ok(Self::Memory { prefix: path }),
            "file" => {
                if path.is_empty() {
                    return Err(invalid("file URL must include a directory".into()));
                }
                let root = match parsed.host_str().filter(|h| !h.is_empty()) {
                    Some(host) => PathBuf::from(format!("/{host}/{path}")),
                    None => PathBuf::from(format!("/{path}")),
                };
                Ok(Self::File { root })
            }
            "s3" => {
                let bucket = parsed
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid("S3 URL must include a bucket name".into()))?
                    .to_string();
                let region = parsed
                    .query_pairs()
                    .find(|(k, _)| k == "region")
                    .map(|(_, v)| v.into_owned());
                Ok(Self::S3 {
                    bucket,
                    prefix: path,
                    region,
                })
            }
            other => Err(invalid(format!("unsupported scheme: {other}"))),
        }
    }
}

/// Listing entry for a stored object.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: ObjectKey,
    pub size: u64,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Storage used by every pipeline stage.
///
/// Implementations must be safe to share across concurrently running
/// batches; no operation takes a lock on shared state.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Key layout of this store.
    fn keys(&self) -> &KeyBuilder;

    /// Write an object only if it does not exist yet.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if written
    /// - `Err(StoreError::AlreadyExists)` if an object is already present
    async fn put_create(&self, key: &ObjectKey, bytes: Bytes) -> StoreResult<()>;

    /// Write an object, replacing any previous version.
    async fn put_overwrite(&self, key: &ObjectKey, bytes: Bytes) -> StoreResult<()>;

    /// Read an object.
    ///
    /// Returns `Err(StoreError::NotFound)` if absent.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;

    /// Check if an object exists.
    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool>;

    /// List objects under a prefix, in no guaranteed order.
    async fn list(&self, prefix: &ObjectKey) -> StoreResult<Vec<ObjectEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_url_keeps_bucket_prefix_and_region() {
        let spec = StoreSpec::parse("s3://my-bucket/compliance/prod?region=ap-southeast-2").unwrap();
        assert_eq!(
            spec,
            StoreSpec::S3 {
                bucket: "my-bucket".into(),
                prefix: "compliance/prod".into(),
                region: Some("ap-southeast-2".into()),
            }
        );
    }

    #[test]
    fn s3_url_without_bucket_is_rejected() {
        let err = StoreSpec::parse("s3:///prefix").unwrap_err();
        assert!(err.to_string().contains("bucket"), "got {err}");
    }

    #[test]
    fn file_url_becomes_absolute_root() {
        let spec = StoreSpec::parse("file:///var/lib/conpack").unwrap();
        assert_eq!(
            spec,
            StoreSpec::File {
                root: PathBuf::from("/var/lib/conpack")
            }
        );
        assert!(StoreSpec::parse("file:///").is_err());
    }

    #[test]
    fn memory_url_needs_no_location() {
        let spec = StoreSpec::parse("memory://").unwrap();
        assert_eq!(
            spec,
            StoreSpec::Memory {
                prefix: String::new()
            }
        );
    }

    #[test]
    fn garbage_and_unknown_schemes_are_invalid() {
        for url in ["not a url", "ftp://host/path"] {
            let err = StoreSpec::parse(url).unwrap_err();
            assert!(matches!(err, StoreError::InvalidSpec { .. }), "{url}: {err:?}");
        }
    }
}
