//! Core engine for atomic checkpoint files on S3-compatible object stores.
//!
//! This crate provides the pieces a stream-processing engine needs to keep its
//! checkpoint directory in an object store:
//!
//! - A single path resolver that turns `s3a://bucket/key` style paths into
//!   bucket/key pairs (`location` module).
//! - A small object-store contract with an AWS SDK backed client and a
//!   versioned in-memory client (`store` module).
//! - A checkpoint manager facade with atomic create (buffer, then one put on
//!   close), version-pinned idempotent delete, and eager paginated listing
//!   (`manager` module).
//! - A blocking wrapper for hosts that drive the manager from synchronous
//!   code (`blocking` module).
//! - Hadoop-style configuration for endpoint, region, path-style access and
//!   credentials (`config` module).
//!
//! Higher-level integration crates (for example, the `s3ckpt` CLI) are
//! expected to depend on this core crate rather than re-implementing the
//! commit and delete protocols.
#![deny(missing_docs)]
pub mod blocking;
pub mod config;
pub mod location;
pub mod manager;
pub mod store;

pub use config::{ConfigError, CredentialSource, StoreConfig};
pub use location::{LocationError, ObjectLocation, ObjectPrefix};
pub use manager::{
    AtomicOutputStream, CheckpointError, CheckpointFileManager, CheckpointInput,
    CheckpointResult, FileStatus, PathFilter, S3CheckpointFileManager, StreamState,
};
pub use store::{
    InMemoryObjectStore, ObjectHead, ObjectListing, ObjectStoreClient, ObjectSummary,
    ObjectVersion, S3ObjectStore, StoreError, StoreOperation, StoreResult,
};
