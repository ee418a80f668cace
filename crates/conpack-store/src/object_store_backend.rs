//! Object store implementation of [`ArtifactStore`].
//!
//! Supports S3, local filesystem, and in-memory backends via the
//! `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, ObjectStoreExt, PutMode, PutOptions, PutPayload};

use super::{ArtifactStore, KeyBuilder, ObjectEntry, ObjectKey, StoreError, StoreResult, StoreSpec};

/// Artifact store backed by `object_store`.
pub struct ObjectStoreArtifactStore {
    inner: Arc<dyn ObjectStore>,
    keys: KeyBuilder,
}

impl ObjectStoreArtifactStore {
    pub async fn from_spec(spec: &StoreSpec) -> StoreResult<Self> {
        let (inner, key_prefix): (Arc<dyn ObjectStore>, &str) = match spec {
            StoreSpec::Memory { prefix } => (Arc::new(InMemory::new()), prefix.as_str()),
            StoreSpec::File { root } => {
                std::fs::create_dir_all(root).map_err(|e| StoreError::Io {
                    message: format!("failed to create store directory {}: {e}", root.display()),
                })?;
                let local = LocalFileSystem::new_with_prefix(root).map_err(|e| StoreError::Io {
                    message: format!("failed to open local store at {}: {e}", root.display()),
                })?;
                (Arc::new(local), "")
            }
            StoreSpec::S3 {
                bucket,
                prefix,
                region,
            } => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_allow_http(false);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                let s3 = builder.build().map_err(|e| StoreError::Io {
                    message: format!("failed to create S3 client for bucket {bucket}: {e}"),
                })?;
                (Arc::new(s3), prefix.as_str())
            }
        };

        Ok(Self {
            inner,
            keys: KeyBuilder::new(key_prefix),
        })
    }

    /// Create a store from a URL string.
    pub async fn from_url(url: &str) -> StoreResult<Self> {
        let spec = StoreSpec::parse(url)?;
        Self::from_spec(&spec).await
    }

    /// Create an in-memory store for testing.
    pub fn memory() -> Self {
        Self::memory_with_prefix("")
    }

    /// Create an in-memory store with a key prefix for testing.
    pub fn memory_with_prefix(prefix: &str) -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            keys: KeyBuilder::new(prefix),
        }
    }

    /// Conditional create where the backend supports it, otherwise
    /// check-then-put (racy, but batch keys are never shared).
    async fn put_if_not_exists(&self, key: &ObjectKey, bytes: Bytes) -> StoreResult<()> {
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        match self
            .inner
            .put_opts(key, PutPayload::from_bytes(bytes.clone()), opts)
            .await
        {
            Ok(_) => return Ok(()),
            Err(object_store::Error::NotSupported { .. }) => {
                tracing::warn!(key = %key, "backend lacks conditional writes, using check-then-put");
            }
            Err(e) => return Err(StoreError::from_object_store(e, key.as_ref())),
        }

        if self.exists(key).await? {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        self.put_overwrite(key, bytes).await
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreArtifactStore {
    fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    async fn put_create(&self, key: &ObjectKey, bytes: Bytes) -> StoreResult<()> {
        self.put_if_not_exists(key, bytes).await
    }

    async fn put_overwrite(&self, key: &ObjectKey, bytes: Bytes) -> StoreResult<()> {
        self.inner
            .put(key, PutPayload::from_bytes(bytes))
            .await
            .map_err(|e| StoreError::from_object_store(e, key.as_ref()))?;
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        let result = self
            .inner
            .get(key)
            .await
            .map_err(|e| StoreError::from_object_store(e, key.as_ref()))?;

        result.bytes().await.map_err(|e| StoreError::Io {
            message: format!("failed to read {}: {}", key, e),
        })
    }

    async fn exists(&self, key: &ObjectKey) -> StoreResult<bool> {
        match self.inner.head(key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StoreError::Io {
                message: format!("failed to check existence of {}: {}", key, e),
            }),
        }
    }

    async fn list(&self, prefix: &ObjectKey) -> StoreResult<Vec<ObjectEntry>> {
        let entries: Vec<_> = self
            .inner
            .list(Some(prefix))
            .try_collect()
            .await
            .map_err(|e| StoreError::Io {
                message: format!("failed to list {}: {}", prefix, e),
            })?;

        Ok(entries
            .into_iter()
            .map(|meta| ObjectEntry {
                key: meta.location,
                size: meta.size as u64,
                modified: Some(meta.last_modified),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = ObjectStoreArtifactStore::memory();
        let key = store.keys().plan_key("job-1");
        let content = Bytes::from("{\"batches\":[]}");

        store.put_create(&key, content.clone()).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_put_create_is_write_once() {
        let store = ObjectStoreArtifactStore::memory();
        let key = store.keys().batch_result_key("job-1", 1);

        store.put_create(&key, Bytes::from("first")).await.unwrap();
        let second = store.put_create(&key, Bytes::from("second")).await;
        assert!(matches!(second, Err(StoreError::AlreadyExists { .. })));

        // The first write survives the refused one.
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from("first"));
    }

    #[tokio::test]
    async fn test_put_overwrite_replaces() {
        let store = ObjectStoreArtifactStore::memory();
        let key = store.keys().artifact_key("job-1", "GENERATION_REPORT.md");

        store.put_overwrite(&key, Bytes::from("v1")).await.unwrap();
        store.put_overwrite(&key, Bytes::from("v2")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from("v2"));
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = ObjectStoreArtifactStore::memory();
        let key = store.keys().batch_result_key("job-1", 99);
        let result = store.get(&key).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_batch_results_is_job_scoped() {
        let store = ObjectStoreArtifactStore::memory_with_prefix("base");
        let keys = store.keys().clone();

        for id in [1, 2, 3] {
            store
                .put_create(&keys.batch_result_key("job-a", id), Bytes::from("{}"))
                .await
                .unwrap();
        }
        store
            .put_create(&keys.batch_result_key("job-b", 1), Bytes::from("{}"))
            .await
            .unwrap();

        let listed = store.list(&keys.batch_results_prefix("job-a")).await.unwrap();
        let mut ids: Vec<u32> = listed
            .iter()
            .filter_map(|e| keys.parse_batch_result_key(&e.key))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
