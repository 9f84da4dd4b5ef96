//! Wrapper prelude.
//!
//! The `s3-checkpoint` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::blocking::BlockingCheckpointFileManager;
pub use crate::store::{InMemoryObjectStore, ObjectStoreClient};
pub use crate::{
    AcceptAll, AtomicOutputStream, CheckpointError, CheckpointFileManager, CheckpointInput,
    FileStatus, PathFilter, S3CheckpointFileManager, StoreConfig, StreamState,
};
