use std::{error::Error, fmt};

use snafu::{Backtrace, prelude::*};

use crate::store::StoreOperation;

/// Errors produced by a concrete store client implementation.
///
/// Backend-specific failures are wrapped in this enum so [`StoreError`] can
/// add bucket/key context without knowing which client produced them.
#[derive(Debug)]
pub enum BackendError {
    /// An error reported by the AWS SDK (service error, transport, signing).
    S3(Box<dyn Error + Send + Sync + 'static>),
    /// A failure injected into [`crate::store::InMemoryObjectStore`].
    Injected(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::S3(e) => write!(f, "S3 error: {e}"),
            BackendError::Injected(msg) => write!(f, "injected failure: {msg}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::S3(e) => Some(e.as_ref()),
            BackendError::Injected(_) => None,
        }
    }
}

/// Errors that can occur while talking to the object store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The object (or the bucket holding it) does not exist.
    #[snafu(display("Object not found: {bucket}/{key}"))]
    NotFound {
        /// Bucket that was addressed.
        bucket: String,
        /// Key that was addressed.
        key: String,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other failure: permissions, network, throttling, service faults.
    #[snafu(display("{operation} failed for {bucket}/{key}: {source}"))]
    Transport {
        /// The store call that failed.
        operation: StoreOperation,
        /// Bucket that was addressed.
        bucket: String,
        /// Key or prefix that was addressed.
        key: String,
        /// Underlying client error.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The store answered with something the contract does not allow,
    /// for example a truncated listing without a continuation token.
    #[snafu(display("{operation} returned an invalid response for bucket {bucket}: {message}"))]
    Protocol {
        /// The store call that misbehaved.
        operation: StoreOperation,
        /// Bucket that was addressed.
        bucket: String,
        /// What was wrong with the response.
        message: String,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

impl StoreError {
    /// True when the store reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
