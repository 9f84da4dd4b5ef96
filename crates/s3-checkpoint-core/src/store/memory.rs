//! Versioned in-memory object store.
//!
//! Behaves like a single S3 endpoint with any number of buckets:
//!
//! - listings are returned in key order and split into pages of
//!   `page_size` entries, with the last key of a page as continuation token;
//! - with versioning enabled every put stacks a new version (`v00000000000000000001`,
//!   ...), deleting the current version makes the previous one current again;
//! - with versioning disabled a put replaces the single `"null"` version.
//!
//! Individual operations can be made to fail with a transport error, and
//! calls are counted per operation, so tests can assert which requests a
//! protocol issued.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::store::{
    BackendError, NotFoundSnafu, ObjectHead, ObjectListing, ObjectStoreClient, ObjectSummary,
    ObjectVersion, StoreOperation, StoreResult, TransportSnafu,
};

/// Default number of entries per listing page, same as S3.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredVersion {
    version: ObjectVersion,
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    // (bucket, key) -> versions, oldest first. Keys with no versions are removed.
    objects: BTreeMap<(String, String), Vec<StoredVersion>>,
    next_version: u64,
    failing: HashSet<StoreOperation>,
    calls: HashMap<StoreOperation, usize>,
}

/// In-memory [`ObjectStoreClient`] with optional versioning and pagination.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    state: Mutex<State>,
    versioning: bool,
    page_size: usize,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    /// Create an unversioned store with S3's default page size.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            versioning: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Enable or disable bucket versioning.
    pub fn with_versioning(mut self, enabled: bool) -> Self {
        self.versioning = enabled;
        self
    }

    /// Set the maximum number of entries per listing page (at least 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every subsequent call of `operation` fail with a transport error.
    pub fn fail_operation(&self, operation: StoreOperation) {
        self.lock().failing.insert(operation);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Number of times `operation` has been called, failed calls included.
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// All versions currently stored for `bucket/key`, oldest first.
    pub fn versions(&self, bucket: &str, key: &str) -> Vec<ObjectVersion> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|versions| versions.iter().map(|v| v.version.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and apply failure injection.
    fn enter(&self, operation: StoreOperation, bucket: &str, key: &str) -> StoreResult<()> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if state.failing.contains(&operation) {
            return Err(BackendError::Injected(format!("{operation} denied"))).context(
                TransportSnafu {
                    operation,
                    bucket,
                    key,
                },
            );
        }
        Ok(())
    }

    fn current(&self, bucket: &str, key: &str) -> StoreResult<StoredVersion> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|versions| versions.last().cloned())
            .context(NotFoundSnafu { bucket, key })
    }

    fn page(&self, bucket: &str, prefix: &str, start_after: Option<&str>) -> ObjectListing {
        let state = self.lock();
        let mut summaries: Vec<ObjectSummary> = state
            .objects
            .range((bucket.to_string(), prefix.to_string())..)
            .take_while(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .filter(|((_, k), _)| start_after.is_none_or(|after| k.as_str() > after))
            .filter_map(|((b, k), versions)| {
                versions.last().map(|current| ObjectSummary {
                    bucket: b.clone(),
                    key: k.clone(),
                    size: current.data.len() as u64,
                    last_modified: current.last_modified,
                })
            })
            .take(self.page_size + 1)
            .collect();

        let truncated = summaries.len() > self.page_size;
        summaries.truncate(self.page_size);
        let continuation = if truncated {
            summaries.last().map(|s| s.key.clone())
        } else {
            None
        };

        ObjectListing {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            summaries,
            truncated,
            continuation,
        }
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<ObjectListing> {
        self.enter(StoreOperation::ListObjects, bucket, prefix)?;
        Ok(self.page(bucket, prefix, None))
    }

    async fn list_next_batch(&self, previous: &ObjectListing) -> StoreResult<ObjectListing> {
        self.enter(
            StoreOperation::ListNextBatch,
            &previous.bucket,
            &previous.prefix,
        )?;
        match previous.continuation.as_deref() {
            Some(token) if previous.truncated => {
                Ok(self.page(&previous.bucket, &previous.prefix, Some(token)))
            }
            // Nothing follows a complete listing.
            _ => Ok(ObjectListing {
                bucket: previous.bucket.clone(),
                prefix: previous.prefix.clone(),
                summaries: Vec::new(),
                truncated: false,
                continuation: None,
            }),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> StoreResult<ObjectVersion> {
        self.enter(StoreOperation::PutObject, bucket, key)?;

        let mut state = self.lock();
        let version = if self.versioning {
            state.next_version += 1;
            ObjectVersion::Id(format!("v{:020}", state.next_version))
        } else {
            ObjectVersion::Latest
        };

        let stored = StoredVersion {
            version: version.clone(),
            data,
            last_modified: Utc::now(),
        };
        let versions = state
            .objects
            .entry((bucket.to_string(), key.to_string()))
            .or_default();
        if !self.versioning {
            versions.clear();
        }
        versions.push(stored);

        Ok(version)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        self.enter(StoreOperation::GetObject, bucket, key)?;
        Ok(self.current(bucket, key)?.data)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        self.enter(StoreOperation::HeadObject, bucket, key)?;
        let current = self.current(bucket, key)?;
        Ok(ObjectHead {
            size: current.data.len() as u64,
            last_modified: current.last_modified,
            version: current.version,
        })
    }

    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version: &ObjectVersion,
    ) -> StoreResult<()> {
        self.enter(StoreOperation::DeleteObjectVersion, bucket, key)?;

        let mut state = self.lock();
        let id = (bucket.to_string(), key.to_string());
        let emptied = match state.objects.get_mut(&id) {
            Some(versions) => {
                versions.retain(|v| &v.version != version);
                versions.is_empty()
            }
            None => false,
        };
        if emptied {
            state.objects.remove(&id);
        }
        // Deleting a version that does not exist is a no-op, as on S3.
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.enter(StoreOperation::ObjectExists, bucket, key)?;
        Ok(self
            .lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn put_get_head_roundtrip() -> TestResult {
        let store = InMemoryObjectStore::new();
        let version = store.put_object("b", "k", Bytes::from_static(b"abc")).await?;
        assert_eq!(version, ObjectVersion::Latest);

        assert_eq!(store.get_object("b", "k").await?, Bytes::from_static(b"abc"));
        let head = store.head_object("b", "k").await?;
        assert_eq!(head.size, 3);
        assert_eq!(head.version, ObjectVersion::Latest);
        assert!(store.object_exists("b", "k").await?);
        assert!(!store.object_exists("other", "k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.head_object("b", "missing").await.expect_err("absent");
        assert!(err.is_not_found());
        let err = store.get_object("b", "missing").await.expect_err("absent");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unversioned_put_replaces_null_version() -> TestResult {
        let store = InMemoryObjectStore::new();
        store.put_object("b", "k", Bytes::from_static(b"1")).await?;
        store.put_object("b", "k", Bytes::from_static(b"2")).await?;
        assert_eq!(store.versions("b", "k"), vec![ObjectVersion::Latest]);

        store
            .delete_object_version("b", "k", &ObjectVersion::Latest)
            .await?;
        assert!(!store.object_exists("b", "k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn versioned_delete_reveals_previous_version() -> TestResult {
        let store = InMemoryObjectStore::new().with_versioning(true);
        let v1 = store.put_object("b", "k", Bytes::from_static(b"1")).await?;
        let v2 = store.put_object("b", "k", Bytes::from_static(b"2")).await?;
        assert_ne!(v1, v2);
        assert_eq!(store.versions("b", "k"), vec![v1.clone(), v2.clone()]);

        store.delete_object_version("b", "k", &v2).await?;
        assert_eq!(store.get_object("b", "k").await?, Bytes::from_static(b"1"));

        // The "null" version does not exist in a versioned bucket.
        store
            .delete_object_version("b", "k", &ObjectVersion::Latest)
            .await?;
        assert_eq!(store.versions("b", "k"), vec![v1]);
        Ok(())
    }

    #[tokio::test]
    async fn listing_is_paginated_in_key_order() -> TestResult {
        let store = InMemoryObjectStore::new().with_page_size(2);
        for key in ["p/c", "p/a", "p/b", "q/x", "p/d", "o/z"] {
            store.put_object("b", key, Bytes::from_static(b"x")).await?;
        }

        let first = store.list_objects("b", "p/").await?;
        assert!(first.truncated);
        let keys: Vec<_> = first.summaries.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["p/a", "p/b"]);

        let second = store.list_next_batch(&first).await?;
        assert!(!second.truncated);
        let keys: Vec<_> = second.summaries.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["p/c", "p/d"]);

        let after_end = store.list_next_batch(&second).await?;
        assert!(after_end.summaries.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn listing_does_not_cross_buckets() -> TestResult {
        let store = InMemoryObjectStore::new();
        store.put_object("a", "k/1", Bytes::new()).await?;
        store.put_object("b", "k/2", Bytes::new()).await?;

        let page = store.list_objects("a", "k/").await?;
        assert_eq!(page.summaries.len(), 1);
        assert_eq!(page.summaries[0].bucket, "a");
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_are_transport_errors() -> TestResult {
        let store = InMemoryObjectStore::new();
        store.fail_operation(StoreOperation::PutObject);

        let err = store
            .put_object("b", "k", Bytes::from_static(b"x"))
            .await
            .expect_err("injected");
        assert!(matches!(
            err,
            StoreError::Transport {
                operation: StoreOperation::PutObject,
                ..
            }
        ));
        assert_eq!(store.call_count(StoreOperation::PutObject), 1);

        store.clear_failures();
        store.put_object("b", "k", Bytes::from_static(b"x")).await?;
        assert_eq!(store.call_count(StoreOperation::PutObject), 2);
        Ok(())
    }
}
