use std::{fmt, io, sync::Arc};

use bytes::BytesMut;
use log::{debug, warn};
use snafu::prelude::*;

use crate::location::ObjectLocation;
use crate::manager::{CheckpointResult, StoreSnafu, StreamClosedSnafu};
use crate::store::{ObjectStoreClient, ObjectVersion};

/// Lifecycle of an [`AtomicOutputStream`].
///
/// `Open` is the only non-terminal state; a stream never returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting writes; nothing is visible in the store.
    Open,
    /// The payload was uploaded and is visible.
    Committed,
    /// The payload was discarded without touching the store.
    Cancelled,
    /// The upload failed or was interrupted; the payload is gone.
    Failed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Open => "open",
            StreamState::Committed => "committed",
            StreamState::Cancelled => "cancelled",
            StreamState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Write handle whose content becomes visible all at once, or not at all.
///
/// Bytes are buffered in memory. [`close`](Self::close) uploads the whole
/// buffer with a single put, replacing any existing object at the same path
/// (last writer wins). [`cancel`](Self::cancel), or dropping the stream while
/// it is still open, discards the buffer and never touches the store.
pub struct AtomicOutputStream {
    client: Arc<dyn ObjectStoreClient>,
    location: ObjectLocation,
    buffer: BytesMut,
    state: StreamState,
    version: Option<ObjectVersion>,
}

impl AtomicOutputStream {
    pub(crate) fn new(client: Arc<dyn ObjectStoreClient>, location: ObjectLocation) -> Self {
        Self {
            client,
            location,
            buffer: BytesMut::new(),
            state: StreamState::Open,
            version: None,
        }
    }

    /// Where the payload will be committed.
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of bytes buffered and not yet committed.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Version the store assigned on commit, once committed.
    pub fn version(&self) -> Option<&ObjectVersion> {
        self.version.as_ref()
    }

    /// Append `data` to the buffer.
    pub fn write(&mut self, data: &[u8]) -> CheckpointResult<()> {
        self.ensure_open()?;
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Upload the buffered payload as one object.
    ///
    /// Closing a committed stream again is a no-op. If the upload fails the
    /// stream ends up [`StreamState::Failed`] and the store error is
    /// returned; the previous object at the path, if any, is untouched.
    pub async fn close(&mut self) -> CheckpointResult<()> {
        match self.state {
            StreamState::Open => {}
            StreamState::Committed => return Ok(()),
            state => {
                return StreamClosedSnafu {
                    path: self.location.to_uri(),
                    state,
                }
                .fail();
            }
        }

        let payload = std::mem::take(&mut self.buffer).freeze();
        // Stays Failed if this future is dropped before the put returns.
        self.state = StreamState::Failed;

        debug!(
            "PutObject {}/{} ({} bytes)",
            self.location.bucket(),
            self.location.key(),
            payload.len()
        );
        let version = self
            .client
            .put_object(self.location.bucket(), self.location.key(), payload)
            .await
            .context(StoreSnafu {
                path: self.location.to_uri(),
            })?;

        self.state = StreamState::Committed;
        self.version = Some(version);
        Ok(())
    }

    /// Discard the buffered payload without any store call.
    ///
    /// Cancelling twice is a no-op; cancelling a committed or failed stream
    /// is an error because its outcome is already decided.
    pub fn cancel(&mut self) -> CheckpointResult<()> {
        match self.state {
            StreamState::Open => {
                self.buffer = BytesMut::new();
                self.state = StreamState::Cancelled;
                Ok(())
            }
            StreamState::Cancelled => Ok(()),
            state => StreamClosedSnafu {
                path: self.location.to_uri(),
                state,
            }
            .fail(),
        }
    }

    fn ensure_open(&self) -> CheckpointResult<()> {
        ensure!(
            self.state == StreamState::Open,
            StreamClosedSnafu {
                path: self.location.to_uri(),
                state: self.state,
            }
        );
        Ok(())
    }
}

impl fmt::Debug for AtomicOutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicOutputStream")
            .field("location", &self.location)
            .field("buffered", &self.buffer.len())
            .field("state", &self.state)
            .field("version", &self.version)
            .finish()
    }
}

impl io::Write for AtomicOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AtomicOutputStream::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing becomes visible before close.
        self.ensure_open().map_err(io::Error::other)
    }
}

impl Drop for AtomicOutputStream {
    fn drop(&mut self) {
        if self.state == StreamState::Open {
            warn!(
                "output stream for {} dropped without close or cancel; discarding {} buffered bytes",
                self.location,
                self.buffer.len()
            );
            self.state = StreamState::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use bytes::Bytes;

    use super::*;
    use crate::manager::CheckpointError;
    use crate::store::{InMemoryObjectStore, StoreOperation};

    type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

    fn stream(store: &Arc<InMemoryObjectStore>, key: &str) -> TestResult<AtomicOutputStream> {
        let location = ObjectLocation::new("bucket1", key)?;
        Ok(AtomicOutputStream::new(store.clone(), location))
    }

    #[tokio::test]
    async fn nothing_is_visible_until_close() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());
        let mut out = stream(&store, "ckpt/0")?;

        out.write(&[1, 2])?;
        out.write(&[3])?;
        assert_eq!(out.len(), 3);
        assert!(!store.object_exists("bucket1", "ckpt/0").await?);
        assert_eq!(store.call_count(StoreOperation::PutObject), 0);

        out.close().await?;
        assert_eq!(out.state(), StreamState::Committed);
        assert_eq!(
            store.get_object("bucket1", "ckpt/0").await?,
            Bytes::from_static(&[1, 2, 3])
        );
        assert_eq!(store.call_count(StoreOperation::PutObject), 1);
        Ok(())
    }

    #[tokio::test]
    async fn close_twice_uploads_once() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());
        let mut out = stream(&store, "ckpt/0")?;
        out.write(b"x")?;
        out.close().await?;
        out.close().await?;
        assert_eq!(store.call_count(StoreOperation::PutObject), 1);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_leaves_existing_object_untouched() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .put_object("bucket1", "ckpt/0", Bytes::from_static(b"old"))
            .await?;

        let mut out = stream(&store, "ckpt/0")?;
        out.write(b"new")?;
        out.cancel()?;
        out.cancel()?;

        assert_eq!(out.state(), StreamState::Cancelled);
        assert_eq!(
            store.get_object("bucket1", "ckpt/0").await?,
            Bytes::from_static(b"old")
        );
        assert_eq!(store.call_count(StoreOperation::PutObject), 1);
        Ok(())
    }

    #[tokio::test]
    async fn terminal_states_reject_further_use() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());

        let mut committed = stream(&store, "ckpt/a")?;
        committed.close().await?;
        assert!(matches!(
            committed.write(b"late"),
            Err(CheckpointError::StreamClosed {
                state: StreamState::Committed,
                ..
            })
        ));
        assert!(committed.cancel().is_err());

        let mut cancelled = stream(&store, "ckpt/b")?;
        cancelled.cancel()?;
        let err = cancelled.close().await.expect_err("closing a cancelled stream");
        assert_eq!(
            err.to_string(),
            "Output stream for s3a://bucket1/ckpt/b is already cancelled"
        );
        assert!(!store.object_exists("bucket1", "ckpt/b").await?);
        Ok(())
    }

    #[tokio::test]
    async fn failed_put_moves_stream_to_failed() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());
        store.fail_operation(StoreOperation::PutObject);

        let mut out = stream(&store, "ckpt/0")?;
        out.write(b"payload")?;
        let err = out.close().await.expect_err("put is failing");
        assert!(matches!(err, CheckpointError::Store { .. }));
        assert_eq!(out.state(), StreamState::Failed);
        assert!(out.is_empty());

        store.clear_failures();
        assert!(out.close().await.is_err());
        assert!(out.cancel().is_err());
        assert!(!store.object_exists("bucket1", "ckpt/0").await?);
        Ok(())
    }

    #[tokio::test]
    async fn dropping_open_stream_commits_nothing() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());
        {
            let mut out = stream(&store, "ckpt/0")?;
            out.write(b"abandoned")?;
        }
        assert!(!store.object_exists("bucket1", "ckpt/0").await?);
        assert_eq!(store.call_count(StoreOperation::PutObject), 0);
        Ok(())
    }

    #[tokio::test]
    async fn io_write_feeds_the_buffer() -> TestResult {
        let store = Arc::new(InMemoryObjectStore::new());
        let mut out = stream(&store, "ckpt/0")?;
        write!(out, "offset={}", 42)?;
        out.flush()?;
        out.close().await?;

        assert_eq!(
            store.get_object("bucket1", "ckpt/0").await?,
            Bytes::from_static(b"offset=42")
        );
        assert!(io::Write::write(&mut out, b"more").is_err());
        Ok(())
    }
}
