//! Object store contract used by the checkpoint manager.
//!
//! The manager only needs a handful of calls from the store: paginated
//! listing, whole-object put/get, head with version id, version-pinned delete
//! and an existence probe. [`ObjectStoreClient`] captures exactly that, so the
//! commit and delete protocols can be exercised against any backend:
//!
//! - [`S3ObjectStore`] talks to AWS S3, MinIO or any S3-compatible service
//!   through the AWS SDK.
//! - [`InMemoryObjectStore`] is a versioned, paginating in-memory store with
//!   failure injection, used by tests.
//!
//! Implementations must be safe to share between concurrent callers; the
//! manager holds one client behind an `Arc` for its whole lifetime.

mod error;
pub mod memory;
pub mod s3;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

pub use error::{BackendError, StoreError};
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

pub(crate) use error::{NotFoundSnafu, ProtocolSnafu, TransportSnafu};

/// General result type used by store clients.
pub type StoreResult<T> = Result<T, StoreError>;

/// Version id sent to the store when an object has no explicit version.
///
/// S3 names the version of an object written while versioning was disabled
/// (or suspended) `"null"`, so deleting that version removes the current
/// object in an unversioned bucket.
pub const NULL_VERSION_ID: &str = "null";

/// The store call an error or log line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// First page of a listing.
    ListObjects,
    /// Follow-up page of a truncated listing.
    ListNextBatch,
    /// Whole-object upload.
    PutObject,
    /// Whole-object download.
    GetObject,
    /// Metadata fetch.
    HeadObject,
    /// Delete pinned to a version id.
    DeleteObjectVersion,
    /// Existence probe.
    ObjectExists,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::ListObjects => "ListObjects",
            StoreOperation::ListNextBatch => "ListNextBatch",
            StoreOperation::PutObject => "PutObject",
            StoreOperation::GetObject => "GetObject",
            StoreOperation::HeadObject => "HeadObject",
            StoreOperation::DeleteObjectVersion => "DeleteObjectVersion",
            StoreOperation::ObjectExists => "ObjectExists",
        };
        f.write_str(name)
    }
}

/// Store-assigned version of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectVersion {
    /// An explicit version id returned by a versioned bucket.
    Id(String),
    /// No version id was reported; addresses the current/latest object.
    Latest,
}

impl ObjectVersion {
    /// Interpret an optional version id from the store.
    ///
    /// Missing and blank ids both mean "unversioned".
    pub fn from_optional(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => ObjectVersion::Id(id.to_string()),
            _ => ObjectVersion::Latest,
        }
    }

    /// The version id to send on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            ObjectVersion::Id(id) => id,
            ObjectVersion::Latest => NULL_VERSION_ID,
        }
    }
}

impl fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time reported by the store.
    pub last_modified: DateTime<Utc>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectListing {
    /// Bucket being listed.
    pub bucket: String,
    /// Prefix being listed.
    pub prefix: String,
    /// Objects on this page, in store order.
    pub summaries: Vec<ObjectSummary>,
    /// True when more pages follow.
    pub truncated: bool,
    /// Opaque token for the next page; present whenever `truncated` is.
    pub continuation: Option<String>,
}

/// Metadata returned by a HEAD call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time reported by the store.
    pub last_modified: DateTime<Utc>,
    /// Current version of the object.
    pub version: ObjectVersion,
}

/// Low-level object store operations required by the checkpoint manager.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// List the first page of objects in `bucket` whose key starts with `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<ObjectListing>;

    /// Fetch the page following `previous`, which must be truncated.
    async fn list_next_batch(&self, previous: &ObjectListing) -> StoreResult<ObjectListing>;

    /// Upload `data` as the complete content of `bucket/key`, replacing any
    /// current object. Readers observe either the old or the new object.
    ///
    /// Returns the version the store assigned to the new object.
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes)
    -> StoreResult<ObjectVersion>;

    /// Download the full content of `bucket/key`.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// Fetch size, modification time and current version of `bucket/key`.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead>;

    /// Delete exactly `version` of `bucket/key`.
    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version: &ObjectVersion,
    ) -> StoreResult<()>;

    /// Report whether `bucket/key` currently exists.
    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;
}
