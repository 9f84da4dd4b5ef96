#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use s3_checkpoint_core::{
    CheckpointError, CheckpointFileManager, InMemoryObjectStore, ObjectHead, ObjectListing,
    ObjectStoreClient, ObjectVersion, S3CheckpointFileManager, StoreError, StoreOperation,
    StoreResult, StreamState, location::resolve, manager::AcceptAll,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const ROOT: &str = "s3a://bucket1/ckpt";

fn manager_over(store: Arc<InMemoryObjectStore>) -> S3CheckpointFileManager {
    S3CheckpointFileManager::with_client(ROOT, store)
}

async fn commit(manager: &S3CheckpointFileManager, path: &str, data: &[u8]) -> TestResult {
    let mut out = manager.create_atomic(path, true)?;
    out.write(data)?;
    out.close().await?;
    Ok(())
}

async fn read_all(
    manager: &S3CheckpointFileManager,
    path: &str,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    manager.open(path).await?.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Store wrapper that lets another writer commit right after the first HEAD.
struct RacingWriter {
    inner: InMemoryObjectStore,
    raced: AtomicBool,
}

#[async_trait]
impl ObjectStoreClient for RacingWriter {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<ObjectListing> {
        self.inner.list_objects(bucket, prefix).await
    }

    async fn list_next_batch(&self, previous: &ObjectListing) -> StoreResult<ObjectListing> {
        self.inner.list_next_batch(previous).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> StoreResult<ObjectVersion> {
        self.inner.put_object(bucket, key, data).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        self.inner.get_object(bucket, key).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let head = self.inner.head_object(bucket, key).await?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner
                .put_object(bucket, key, Bytes::from_static(b"newer"))
                .await?;
        }
        Ok(head)
    }

    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version: &ObjectVersion,
    ) -> StoreResult<()> {
        self.inner.delete_object_version(bucket, key, version).await
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.inner.object_exists(bucket, key).await
    }
}

/// Store that claims every listing is truncated but never hands out a token.
struct TokenlessPager;

#[async_trait]
impl ObjectStoreClient for TokenlessPager {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<ObjectListing> {
        Ok(ObjectListing {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            summaries: Vec::new(),
            truncated: true,
            continuation: None,
        })
    }

    async fn list_next_batch(&self, previous: &ObjectListing) -> StoreResult<ObjectListing> {
        self.list_objects(&previous.bucket, &previous.prefix).await
    }

    async fn put_object(&self, _: &str, _: &str, _: Bytes) -> StoreResult<ObjectVersion> {
        Ok(ObjectVersion::Latest)
    }

    async fn get_object(&self, _: &str, _: &str) -> StoreResult<Bytes> {
        Ok(Bytes::new())
    }

    async fn head_object(&self, _: &str, _: &str) -> StoreResult<ObjectHead> {
        Ok(ObjectHead {
            size: 0,
            last_modified: chrono::DateTime::UNIX_EPOCH,
            version: ObjectVersion::Latest,
        })
    }

    async fn delete_object_version(&self, _: &str, _: &str, _: &ObjectVersion) -> StoreResult<()> {
        Ok(())
    }

    async fn object_exists(&self, _: &str, _: &str) -> StoreResult<bool> {
        Ok(false)
    }
}

#[test]
fn commit_log_path_resolves_to_bucket_and_key() -> TestResult {
    let location = resolve("s3a://bucket1/ckpt/_commits/0")?;
    assert_eq!(location.bucket(), "bucket1");
    assert_eq!(location.key(), "ckpt/_commits/0");
    assert_eq!(resolve("s3a://bucket1/ckpt/_commits/0")?, location);
    Ok(())
}

#[tokio::test]
async fn written_bytes_read_back_after_commit() -> TestResult {
    let store = Arc::new(InMemoryObjectStore::new());
    let manager = manager_over(store.clone());

    let mut out = manager.create_atomic("s3a://bucket1/ckpt/_commits/0", false)?;
    out.write(&[1, 2, 3])?;
    assert!(!manager.exists("s3a://bucket1/ckpt/_commits/0").await?);
    assert!(manager.open("s3a://bucket1/ckpt/_commits/0").await.is_err());

    out.close().await?;
    assert!(manager.exists("s3a://bucket1/ckpt/_commits/0").await?);
    assert_eq!(
        read_all(&manager, "s3a://bucket1/ckpt/_commits/0").await?,
        [1u8, 2, 3]
    );
    assert_eq!(store.call_count(StoreOperation::PutObject), 1);
    Ok(())
}

#[tokio::test]
async fn last_committed_writer_wins() -> TestResult {
    let manager = manager_over(Arc::new(InMemoryObjectStore::new()));
    let path = "s3a://bucket1/ckpt/metadata";

    let mut first = manager.create_atomic(path, false)?;
    let mut second = manager.create_atomic(path, false)?;
    first.write(b"first")?;
    second.write(b"second")?;
    second.close().await?;
    first.close().await?;

    assert_eq!(read_all(&manager, path).await?, b"first");
    Ok(())
}

#[tokio::test]
async fn cancel_never_changes_the_existing_file() -> TestResult {
    let store = Arc::new(InMemoryObjectStore::new());
    let manager = manager_over(store.clone());
    commit(&manager, "s3a://bucket1/ckpt/offsets/3", b"committed").await?;

    let mut out = manager.create_atomic("s3a://bucket1/ckpt/offsets/3", true)?;
    out.write(b"replacement")?;
    out.cancel()?;
    assert_eq!(out.state(), StreamState::Cancelled);

    assert_eq!(
        read_all(&manager, "s3a://bucket1/ckpt/offsets/3").await?,
        b"committed"
    );
    assert_eq!(store.call_count(StoreOperation::PutObject), 1);
    Ok(())
}

#[tokio::test]
async fn failed_commit_keeps_previous_content() -> TestResult {
    let store = Arc::new(InMemoryObjectStore::new());
    let manager = manager_over(store.clone());
    commit(&manager, "s3a://bucket1/ckpt/offsets/4", b"v1").await?;

    store.fail_operation(StoreOperation::PutObject);
    let mut out = manager.create_atomic("s3a://bucket1/ckpt/offsets/4", true)?;
    out.write(b"v2")?;
    let err = out.close().await.expect_err("put is failing");
    assert!(matches!(
        err,
        CheckpointError::Store {
            source: StoreError::Transport {
                operation: StoreOperation::PutObject,
                ..
            },
            ..
        }
    ));
    assert_eq!(out.state(), StreamState::Failed);

    store.clear_failures();
    assert_eq!(read_all(&manager, "s3a://bucket1/ckpt/offsets/4").await?, b"v1");
    Ok(())
}

#[tokio::test]
async fn delete_of_never_written_path_succeeds_twice() -> TestResult {
    let manager = manager_over(Arc::new(InMemoryObjectStore::new()));
    manager.delete("s3a://bucket1/ckpt/never/written").await?;
    manager.delete("s3a://bucket1/ckpt/never/written").await?;
    Ok(())
}

#[tokio::test]
async fn delete_then_delete_again() -> TestResult {
    let manager = manager_over(Arc::new(InMemoryObjectStore::new()));
    commit(&manager, "s3a://bucket1/ckpt/sources/0/0", b"x").await?;

    manager.delete("s3a://bucket1/ckpt/sources/0/0").await?;
    assert!(!manager.exists("s3a://bucket1/ckpt/sources/0/0").await?);
    manager.delete("s3a://bucket1/ckpt/sources/0/0").await?;
    Ok(())
}

#[tokio::test]
async fn delete_spares_object_written_after_head() -> TestResult {
    let store = Arc::new(RacingWriter {
        inner: InMemoryObjectStore::new().with_versioning(true),
        raced: AtomicBool::new(false),
    });
    let manager = S3CheckpointFileManager::with_client(ROOT, store.clone());
    commit(&manager, "s3a://bucket1/ckpt/state/1", b"older").await?;

    manager.delete("s3a://bucket1/ckpt/state/1").await?;

    assert!(manager.exists("s3a://bucket1/ckpt/state/1").await?);
    assert_eq!(read_all(&manager, "s3a://bucket1/ckpt/state/1").await?, b"newer");
    assert_eq!(store.inner.versions("bucket1", "ckpt/state/1").len(), 1);
    Ok(())
}

#[tokio::test]
async fn listing_returns_each_object_once_across_pages() -> TestResult {
    let store = Arc::new(InMemoryObjectStore::new().with_page_size(3));
    let manager = manager_over(store.clone());

    let mut expected = BTreeSet::new();
    for batch in 0..10 {
        let path = format!("s3a://bucket1/ckpt/_commits/{batch:04}");
        commit(&manager, &path, batch.to_string().as_bytes()).await?;
        expected.insert(path);
    }
    commit(&manager, "s3a://bucket1/other/0", b"elsewhere").await?;

    let statuses = manager.list("s3a://bucket1/ckpt/_commits/", &AcceptAll).await?;
    assert_eq!(statuses.len(), 10);
    let listed: BTreeSet<String> = statuses.iter().map(|s| s.path()).collect();
    assert_eq!(listed, expected);
    assert!(statuses.iter().all(|s| !s.is_directory && s.replication == 1));
    assert_eq!(store.call_count(StoreOperation::ListNextBatch), 3);
    Ok(())
}

#[tokio::test]
async fn truncated_listing_without_token_is_a_protocol_error() {
    let manager = S3CheckpointFileManager::with_client(ROOT, Arc::new(TokenlessPager));
    let err = manager
        .list("s3a://bucket1/ckpt/", &AcceptAll)
        .await
        .expect_err("no continuation token");
    assert!(matches!(
        err,
        CheckpointError::Store {
            source: StoreError::Protocol { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn checkpoint_directory_is_the_root_and_starts_empty() -> TestResult {
    let store = Arc::new(InMemoryObjectStore::new());
    let manager = manager_over(store.clone());

    let root = manager.create_checkpoint_directory().to_string();
    assert_eq!(root, ROOT);
    manager.mkdirs(&root)?;
    assert!(manager.list(&root, &AcceptAll).await?.is_empty());
    assert_eq!(store.call_count(StoreOperation::PutObject), 0);
    Ok(())
}

#[tokio::test]
async fn bucket_root_checkpoint_directory_lists_its_files() -> TestResult {
    let store = Arc::new(InMemoryObjectStore::new());
    let manager = S3CheckpointFileManager::with_client("s3a://bucket1/", store);

    let root = manager.create_checkpoint_directory().to_string();
    assert!(manager.list(&root, &AcceptAll).await?.is_empty());

    commit(&manager, "s3a://bucket1/metadata", b"{}").await?;
    commit(&manager, "s3a://bucket1/offsets/0", b"0").await?;
    let listed: Vec<String> = manager
        .list(&root, &AcceptAll)
        .await?
        .iter()
        .map(|s| s.path())
        .collect();
    assert_eq!(listed, ["s3a://bucket1/metadata", "s3a://bucket1/offsets/0"]);
    Ok(())
}

#[tokio::test]
async fn concurrent_writers_on_distinct_paths() -> TestResult {
    let manager = manager_over(Arc::new(InMemoryObjectStore::new()));

    let mut handles = Vec::new();
    for id in 0..8u8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let path = format!("s3a://bucket1/ckpt/offsets/{id}");
            let mut out = manager.create_atomic(&path, true)?;
            out.write(&[id; 4])?;
            out.close().await?;
            Ok::<_, CheckpointError>(path)
        }));
    }

    for (id, handle) in handles.into_iter().enumerate() {
        let path = handle.await??;
        assert_eq!(read_all(&manager, &path).await?, [id as u8; 4]);
    }
    Ok(())
}
