//! Checkpoint file manager on top of an object store.
//!
//! [`CheckpointFileManager`] is the filesystem-like surface a stream
//! processing engine uses for its checkpoint directory. The object-store
//! implementation, [`S3CheckpointFileManager`], gives it two guarantees the
//! store does not offer natively:
//!
//! - **Atomic create.** [`AtomicOutputStream`] buffers in memory and commits
//!   with one put on close, so a checkpoint file is either absent or
//!   complete. Cancelling or dropping the stream leaves no trace.
//! - **Deterministic delete.** Delete pins the version observed by a HEAD
//!   immediately before it, so it never removes a newer object written
//!   concurrently, and deleting an absent file succeeds.
//!
//! Directories do not exist in the store: `mkdirs` is a no-op and listing
//! is a flat prefix scan.

mod delete;
mod error;
mod input;
mod listing;
mod output;
mod status;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use log::debug;
use snafu::prelude::*;

use crate::config::StoreConfig;
use crate::location::{self, ObjectLocation};
use crate::store::{ObjectStoreClient, S3ObjectStore};

pub use error::{CheckpointError, CheckpointResult};
pub use input::CheckpointInput;
pub use output::{AtomicOutputStream, StreamState};
pub use status::{AcceptAll, DEFAULT_BLOCK_SIZE, DEFAULT_REPLICATION, FileStatus, PathFilter};

pub(crate) use error::{ConfigSnafu, InvalidPathSnafu, RuntimeSnafu, StoreSnafu, StreamClosedSnafu};

/// Filesystem-style operations a checkpointing host needs.
#[async_trait]
pub trait CheckpointFileManager: Send + Sync {
    /// List every file under `path` (a key prefix).
    ///
    /// A bucket-only path such as `s3a://bucket1/` lists the whole bucket.
    /// `filter` is accepted for interface compatibility and not applied; see
    /// [`PathFilter::retain`].
    async fn list(&self, path: &str, filter: &dyn PathFilter) -> CheckpointResult<Vec<FileStatus>>;

    /// Create a directory. Object stores have none, so this does nothing.
    fn mkdirs(&self, path: &str) -> CheckpointResult<()>;

    /// Start an atomic write of `path`.
    ///
    /// An existing file is replaced on commit whatever
    /// `overwrite_if_possible` says; the last committed writer wins.
    fn create_atomic(
        &self,
        path: &str,
        overwrite_if_possible: bool,
    ) -> CheckpointResult<AtomicOutputStream>;

    /// Fetch the content of `path`.
    ///
    /// The whole object is downloaded into memory before this returns; the
    /// [`CheckpointInput`] then reads from that buffer. Checkpoint files are
    /// small enough for this. Large objects should be read through the
    /// store client directly.
    async fn open(&self, path: &str) -> CheckpointResult<CheckpointInput>;

    /// Whether `path` currently exists.
    async fn exists(&self, path: &str) -> CheckpointResult<bool>;

    /// Delete `path`. Deleting a file that does not exist succeeds.
    async fn delete(&self, path: &str) -> CheckpointResult<()>;

    /// Whether the files live on the local filesystem.
    fn is_local(&self) -> bool;

    /// The checkpoint root this manager was created for.
    fn create_checkpoint_directory(&self) -> &str;
}

/// [`CheckpointFileManager`] backed by an S3-compatible object store.
///
/// Holds one shared client for its whole lifetime; streams it hands out keep
/// their own reference to it.
#[derive(Clone)]
pub struct S3CheckpointFileManager {
    root: String,
    client: Arc<dyn ObjectStoreClient>,
}

impl S3CheckpointFileManager {
    /// Build a manager for `root` with an AWS SDK client configured from
    /// `config`.
    pub async fn connect(root: impl Into<String>, config: &StoreConfig) -> CheckpointResult<Self> {
        let store = S3ObjectStore::connect(config).await.context(ConfigSnafu)?;
        Ok(Self::with_client(root, Arc::new(store)))
    }

    /// Build a manager for `root` over an existing client.
    pub fn with_client(root: impl Into<String>, client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            root: root.into(),
            client,
        }
    }

    /// The client all operations go through.
    pub fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        &self.client
    }

    fn resolve(&self, path: &str) -> CheckpointResult<ObjectLocation> {
        location::resolve(path).context(InvalidPathSnafu)
    }
}

impl fmt::Debug for S3CheckpointFileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CheckpointFileManager")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CheckpointFileManager for S3CheckpointFileManager {
    async fn list(&self, path: &str, _filter: &dyn PathFilter) -> CheckpointResult<Vec<FileStatus>> {
        let prefix = location::resolve_prefix(path).context(InvalidPathSnafu)?;
        listing::list_all(self.client.as_ref(), &prefix)
            .await
            .context(StoreSnafu { path })
    }

    fn mkdirs(&self, _path: &str) -> CheckpointResult<()> {
        Ok(())
    }

    fn create_atomic(
        &self,
        path: &str,
        _overwrite_if_possible: bool,
    ) -> CheckpointResult<AtomicOutputStream> {
        let location = self.resolve(path)?;
        Ok(AtomicOutputStream::new(self.client.clone(), location))
    }

    async fn open(&self, path: &str) -> CheckpointResult<CheckpointInput> {
        let location = self.resolve(path)?;
        debug!("GetObject {}/{}", location.bucket(), location.key());
        let data = self
            .client
            .get_object(location.bucket(), location.key())
            .await
            .context(StoreSnafu { path })?;
        Ok(CheckpointInput::new(location, data))
    }

    async fn exists(&self, path: &str) -> CheckpointResult<bool> {
        let location = self.resolve(path)?;
        debug!("ObjectExists {}/{}", location.bucket(), location.key());
        self.client
            .object_exists(location.bucket(), location.key())
            .await
            .context(StoreSnafu { path })
    }

    async fn delete(&self, path: &str) -> CheckpointResult<()> {
        let location = self.resolve(path)?;
        delete::delete_current_version(self.client.as_ref(), &location)
            .await
            .context(StoreSnafu { path })
    }

    fn is_local(&self) -> bool {
        false
    }

    fn create_checkpoint_directory(&self) -> &str {
        &self.root
    }
}
