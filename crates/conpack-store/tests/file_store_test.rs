//! File-backed store behaviour through the public API.

use conpack_store::{ArtifactStore, ObjectStoreArtifactStore, StoreError};

fn file_url(dir: &std::path::Path) -> String {
    format!("file://{}", dir.display())
}

#[tokio::test]
async fn file_store_persists_across_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let url = file_url(tmp.path());

    let writer = ObjectStoreArtifactStore::from_url(&url).await.unwrap();
    let key = writer.keys().batch_result_key("job-42", 3);
    writer
        .put_create(&key, conpack_store::bytes::Bytes::from("{\"batch_id\":3}"))
        .await
        .unwrap();

    let reader = ObjectStoreArtifactStore::from_url(&url).await.unwrap();
    let bytes = reader.get(&key).await.unwrap();
    assert_eq!(&bytes[..], b"{\"batch_id\":3}");

    let on_disk = tmp
        .path()
        .join("conformance-packs/job-42/batch-results/batch-0003.json");
    assert!(on_disk.exists(), "expected {} to exist", on_disk.display());
}

#[tokio::test]
async fn file_store_refuses_second_create() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ObjectStoreArtifactStore::from_url(&file_url(tmp.path()))
        .await
        .unwrap();
    let key = store.keys().plan_key("job");

    store
        .put_create(&key, conpack_store::bytes::Bytes::from("a"))
        .await
        .unwrap();
    let err = store
        .put_create(&key, conpack_store::bytes::Bytes::from("b"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "got {err:?}");
}

#[tokio::test]
async fn unsupported_scheme_is_rejected() {
    let err = ObjectStoreArtifactStore::from_url("ftp://host/path")
        .await
        .err()
        .expect("ftp must be rejected");
    assert!(matches!(err, StoreError::InvalidSpec { .. }));
}
