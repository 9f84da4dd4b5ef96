//! Synchronous facade over the checkpoint manager.
//!
//! Hosts that drive checkpointing from plain threads wrap an
//! [`S3CheckpointFileManager`] in a [`BlockingCheckpointFileManager`], which
//! owns a current-thread Tokio runtime and blocks on every store call.
//!
//! None of these methods may be called from inside an async context; doing so
//! panics inside Tokio.

use std::{io, sync::Arc};

use snafu::prelude::*;
use tokio::runtime::{Builder, Runtime};

use crate::config::StoreConfig;
use crate::location::ObjectLocation;
use crate::manager::{
    AtomicOutputStream, CheckpointFileManager, CheckpointInput, CheckpointResult, FileStatus,
    PathFilter, RuntimeSnafu, S3CheckpointFileManager, StreamState,
};
use crate::store::ObjectVersion;

fn new_runtime() -> CheckpointResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .context(RuntimeSnafu)
}

/// Blocking wrapper around [`S3CheckpointFileManager`].
#[derive(Debug)]
pub struct BlockingCheckpointFileManager {
    runtime: Arc<Runtime>,
    inner: S3CheckpointFileManager,
}

impl BlockingCheckpointFileManager {
    /// Build the runtime, then an AWS SDK backed manager for `root`.
    pub fn connect(root: impl Into<String>, config: &StoreConfig) -> CheckpointResult<Self> {
        let runtime = new_runtime()?;
        let inner = runtime.block_on(S3CheckpointFileManager::connect(root, config))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            inner,
        })
    }

    /// Wrap an existing manager.
    pub fn new(inner: S3CheckpointFileManager) -> CheckpointResult<Self> {
        Ok(Self {
            runtime: Arc::new(new_runtime()?),
            inner,
        })
    }

    /// The async manager every call is forwarded to.
    pub fn inner(&self) -> &S3CheckpointFileManager {
        &self.inner
    }

    /// See [`CheckpointFileManager::list`].
    pub fn list(&self, path: &str, filter: &dyn PathFilter) -> CheckpointResult<Vec<FileStatus>> {
        self.runtime.block_on(self.inner.list(path, filter))
    }

    /// See [`CheckpointFileManager::mkdirs`].
    pub fn mkdirs(&self, path: &str) -> CheckpointResult<()> {
        self.inner.mkdirs(path)
    }

    /// See [`CheckpointFileManager::create_atomic`].
    pub fn create_atomic(
        &self,
        path: &str,
        overwrite_if_possible: bool,
    ) -> CheckpointResult<BlockingAtomicOutputStream> {
        let inner = self.inner.create_atomic(path, overwrite_if_possible)?;
        Ok(BlockingAtomicOutputStream {
            runtime: Arc::clone(&self.runtime),
            inner,
        })
    }

    /// See [`CheckpointFileManager::open`].
    pub fn open(&self, path: &str) -> CheckpointResult<CheckpointInput> {
        self.runtime.block_on(self.inner.open(path))
    }

    /// See [`CheckpointFileManager::exists`].
    pub fn exists(&self, path: &str) -> CheckpointResult<bool> {
        self.runtime.block_on(self.inner.exists(path))
    }

    /// See [`CheckpointFileManager::delete`].
    pub fn delete(&self, path: &str) -> CheckpointResult<()> {
        self.runtime.block_on(self.inner.delete(path))
    }

    /// Always false.
    pub fn is_local(&self) -> bool {
        self.inner.is_local()
    }

    /// See [`CheckpointFileManager::create_checkpoint_directory`].
    pub fn create_checkpoint_directory(&self) -> &str {
        self.inner.create_checkpoint_directory()
    }
}

/// Blocking counterpart of [`AtomicOutputStream`].
#[derive(Debug)]
pub struct BlockingAtomicOutputStream {
    runtime: Arc<Runtime>,
    inner: AtomicOutputStream,
}

impl BlockingAtomicOutputStream {
    /// Where the payload will be committed.
    pub fn location(&self) -> &ObjectLocation {
        self.inner.location()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    /// Version the store assigned on commit, once committed.
    pub fn version(&self) -> Option<&ObjectVersion> {
        self.inner.version()
    }

    /// Append `data` to the buffer.
    pub fn write(&mut self, data: &[u8]) -> CheckpointResult<()> {
        self.inner.write(data)
    }

    /// Commit the buffered payload; blocks until the upload finishes.
    pub fn close(&mut self) -> CheckpointResult<()> {
        self.runtime.block_on(self.inner.close())
    }

    /// Discard the buffered payload.
    pub fn cancel(&mut self) -> CheckpointResult<()> {
        self.inner.cancel()
    }
}

impl io::Write for BlockingAtomicOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }
}
