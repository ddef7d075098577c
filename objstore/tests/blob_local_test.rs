//! Facade tests against a local filesystem backend.

use objstore::{
    Backend, BlobStorage, CancellationToken, CredentialBundle, LocalSpec, S3Spec,
    StaticSecretResolver, StorageError, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY,
};
use tempfile::TempDir;

fn local_storage(temp: &TempDir) -> BlobStorage {
    BlobStorage::from_parts(&Backend::local(temp.path().to_string_lossy()), None)
        .expect("local backend")
}

#[tokio::test]
async fn test_sample_roundtrip() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    assert!(!storage.exists("data/sample.txt", &cancel).await.unwrap());

    storage
        .upload("data/sample.txt", b"sample data", "", &cancel)
        .await
        .unwrap();
    assert!(storage.exists("data/sample.txt", &cancel).await.unwrap());

    let data = storage.get("data/sample.txt", &cancel).await.unwrap();
    assert_eq!(&data[..], b"sample data");

    let listed = storage.list("data", &cancel).await.unwrap();
    assert_eq!(listed, vec![objstore::Bytes::from("sample data")]);

    storage
        .delete("data/sample.txt", false, &cancel)
        .await
        .unwrap();
    let err = storage.get("data/sample.txt", &cancel).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!storage.exists("data/sample.txt", &cancel).await.unwrap());
}

#[tokio::test]
async fn test_upload_overwrites() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    storage.upload("a.txt", b"version 1", "text/plain", &cancel).await.unwrap();
    storage.upload("a.txt", b"v2", "text/plain", &cancel).await.unwrap();
    assert_eq!(&storage.get("a.txt", &cancel).await.unwrap()[..], b"v2");
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    let err = storage.delete("nope/missing.txt", false, &cancel).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_skips_directories_and_recurses() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    storage.upload("logs/a.log", b"a", "", &cancel).await.unwrap();
    storage.upload("logs/2024/b.log", b"b", "", &cancel).await.unwrap();
    storage.mark_as_directory("logs/empty", &cancel).await.unwrap();
    storage.upload("other/c.log", b"c", "", &cancel).await.unwrap();

    let listed = storage.list("logs", &cancel).await.unwrap();
    assert_eq!(listed, vec!["b", "a"]);

    assert!(storage.list("missing", &cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mark_as_directory_is_listed() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    storage.mark_as_directory("empty", &cancel).await.unwrap();

    let dirs = storage.list_dir_n("", 0, &cancel).await.unwrap();
    assert!(dirs.contains(&"empty/".to_string()));
    assert!(temp.path().join("empty").is_dir());
    assert!(storage.exists("empty/", &cancel).await.unwrap());
}

#[tokio::test]
async fn test_list_dir_n_depths() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    storage.upload("a/b/c/file.txt", b"x", "", &cancel).await.unwrap();
    storage.mark_as_directory("a/x", &cancel).await.unwrap();
    storage.upload("top.txt", b"x", "", &cancel).await.unwrap();

    assert_eq!(storage.list_dir_n("", 0, &cancel).await.unwrap(), vec!["a/"]);
    assert_eq!(
        storage.list_dir_n("", 1, &cancel).await.unwrap(),
        vec!["a/", "a/b/", "a/x/"]
    );
    assert_eq!(
        storage.list_dir_n("", -1, &cancel).await.unwrap(),
        vec!["a/", "a/b/", "a/b/c/", "a/x/"]
    );
    assert_eq!(
        storage.list_dir_n("a", 0, &cancel).await.unwrap(),
        vec!["a/b/", "a/x/"]
    );
    assert!(storage.list_dir_n("a/x", -1, &cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_directory() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    storage.upload("d/one.txt", b"1", "", &cancel).await.unwrap();
    storage.upload("d/sub/two.txt", b"2", "", &cancel).await.unwrap();
    storage.mark_as_directory("d/empty", &cancel).await.unwrap();
    storage.upload("keep/three.txt", b"3", "", &cancel).await.unwrap();

    storage.delete("d", true, &cancel).await.unwrap();

    assert!(!storage.exists("d/one.txt", &cancel).await.unwrap());
    assert!(!storage.exists("d/sub/two.txt", &cancel).await.unwrap());
    assert!(!temp.path().join("d").exists());
    assert!(storage.exists("keep/three.txt", &cancel).await.unwrap());
    assert_eq!(storage.list_dir_n("", -1, &cancel).await.unwrap(), vec!["keep/"]);
}

#[tokio::test]
async fn test_backend_prefix_is_applied() {
    let temp = TempDir::new().unwrap();
    let backend = Backend {
        local: Some(LocalSpec {
            mount_path: temp.path().to_string_lossy().to_string(),
            prefix: Some("/base/".to_string()),
        }),
        ..Default::default()
    };
    std::fs::create_dir_all(temp.path().join("base")).unwrap();
    let storage = BlobStorage::from_parts(&backend, None).unwrap();
    let cancel = CancellationToken::new();

    storage.upload("data/file.txt", b"x", "", &cancel).await.unwrap();
    assert!(temp.path().join("base/data/file.txt").is_file());

    assert_eq!(storage.list_dir_n("", 0, &cancel).await.unwrap(), vec!["data/"]);
}

#[tokio::test]
async fn test_cancelled_token_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = storage
        .upload("data/sample.txt", b"sample data", "", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Cancelled));
    assert!(!temp.path().join("data/sample.txt").exists());

    let err = storage.list_dir_n("", -1, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_check_access_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let storage = local_storage(&temp);
    let cancel = CancellationToken::new();

    storage
        .check_access("access/check.txt", b"access check", "text/plain", &cancel)
        .await
        .unwrap();
    assert!(!storage.exists("access/check.txt", &cancel).await.unwrap());
}

#[tokio::test]
async fn test_new_with_resolver() {
    let temp = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let resolver = StaticSecretResolver::new();

    let backend = Backend::local(temp.path().to_string_lossy());
    let storage = BlobStorage::new(&resolver, "default", &backend).await.unwrap();
    storage.upload("x.txt", b"x", "", &cancel).await.unwrap();

    let s3 = Backend::s3(S3Spec {
        bucket: "kubestash".to_string(),
        ..Default::default()
    })
    .with_secret("s3-secret");
    let err = BlobStorage::new(&resolver, "default", &s3).await.unwrap_err();
    assert!(matches!(err, StorageError::SecretNotFound { .. }));

    let resolver = resolver.with_secret(
        CredentialBundle::new("default", "s3-secret").with_entry(AWS_ACCESS_KEY_ID, "id"),
    );
    let err = BlobStorage::new(&resolver, "default", &s3).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Storage secret default/s3-secret missing {} key", AWS_SECRET_ACCESS_KEY)
    );
}

#[tokio::test]
async fn test_unknown_provider_fails_construction() {
    let resolver = StaticSecretResolver::new();
    let err = BlobStorage::new(&resolver, "default", &Backend::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownProvider(_)));
}

#[tokio::test]
async fn test_parent_segments_cannot_leave_prefix() {
    let temp = TempDir::new().unwrap();
    for tenant in ["a", "b"] {
        std::fs::create_dir_all(temp.path().join(tenant)).unwrap();
    }
    let scoped = |prefix: &str| {
        let backend = Backend {
            local: Some(LocalSpec {
                mount_path: temp.path().to_string_lossy().to_string(),
                prefix: Some(prefix.to_string()),
            }),
            ..Default::default()
        };
        BlobStorage::from_parts(&backend, None).unwrap()
    };
    let (a, b) = (scoped("a"), scoped("b"));
    let cancel = CancellationToken::new();

    b.upload("f.txt", b"secret of b", "", &cancel).await.unwrap();

    let err = a.get("../b/f.txt", &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
    let err = a.delete("../b", true, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
    assert!(temp.path().join("b/f.txt").is_file());
}
