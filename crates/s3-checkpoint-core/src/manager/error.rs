use snafu::{Backtrace, prelude::*};

use crate::config::ConfigError;
use crate::location::LocationError;
use crate::manager::StreamState;
use crate::store::StoreError;

/// Errors surfaced by the checkpoint file manager.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CheckpointError {
    /// The path could not be mapped to a bucket and key.
    #[snafu(display("Invalid checkpoint path: {source}"))]
    InvalidPath {
        /// Underlying resolver error.
        source: LocationError,
    },

    /// A store call failed while serving `path`.
    #[snafu(display("Object store error for {path}: {source}"))]
    Store {
        /// Logical path the operation was about.
        path: String,
        /// Underlying store error.
        #[snafu(backtrace)]
        source: StoreError,
    },

    /// An output stream was used after it reached a terminal state.
    #[snafu(display("Output stream for {path} is already {state}"))]
    StreamClosed {
        /// Logical path the stream writes to.
        path: String,
        /// State the stream was in.
        state: StreamState,
    },

    /// The store configuration was rejected.
    #[snafu(display("Invalid store configuration: {source}"))]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },

    /// The Tokio runtime behind the blocking facade could not be started.
    #[snafu(display("Failed to start Tokio runtime: {source}"))]
    Runtime {
        /// Underlying I/O error.
        source: std::io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

impl CheckpointError {
    /// True when the store reported the addressed object as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CheckpointError::Store { source, .. } if source.is_not_found())
    }
}

/// General result type used by the checkpoint manager.
pub type CheckpointResult<T> = Result<T, CheckpointError>;
