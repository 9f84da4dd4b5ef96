//! # s3-checkpoint
//!
//! Atomic checkpoint files on S3-compatible object stores.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use s3_checkpoint::prelude::*;
//!
//! let manager = S3CheckpointFileManager::connect("s3a://bucket1/ckpt", &StoreConfig::default()).await?;
//! let mut out = manager.create_atomic("s3a://bucket1/ckpt/_commits/0", false)?;
//! out.write(b"v1")?;
//! out.close().await?;
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Object store clients (wrapper-only).
pub mod store {
    pub use s3_checkpoint_core::store::{
        InMemoryObjectStore, ObjectHead, ObjectListing, ObjectStoreClient, ObjectSummary,
        ObjectVersion, S3ObjectStore, StoreError, StoreOperation, StoreResult,
    };
}

/// Synchronous facade (wrapper-only).
pub mod blocking {
    pub use s3_checkpoint_core::blocking::{
        BlockingAtomicOutputStream, BlockingCheckpointFileManager,
    };
}

pub use s3_checkpoint_core::config::{ConfigError, CredentialSource, StoreConfig};
pub use s3_checkpoint_core::location::{
    LocationError, ObjectLocation, ObjectPrefix, resolve, resolve_prefix,
};
pub use s3_checkpoint_core::manager::{
    AcceptAll, AtomicOutputStream, CheckpointError, CheckpointFileManager, CheckpointInput,
    CheckpointResult, FileStatus, PathFilter, S3CheckpointFileManager, StreamState,
};
