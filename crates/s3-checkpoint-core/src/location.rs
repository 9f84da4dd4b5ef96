//! Logical path to bucket/key decomposition.
//!
//! Every manager operation goes through [`resolve`] (or [`resolve_prefix`]
//! for listings, where the key may be empty), so the mapping from a
//! filesystem-style checkpoint path to an object-store address lives in one
//! place. The mapping is deliberately literal: repeated separators are kept,
//! nothing is percent-decoded, and the key is whatever follows the first
//! separator after the bucket. This matches the flat key space of the store.
//!
//! ```text
//! s3a://bucket1/ckpt/_commits/0
//!        ^^^^^^^ ^^^^^^^^^^^^^^^
//!        bucket  key
//! ```

use std::fmt;

use snafu::prelude::*;

/// Scheme prefix stripped from logical paths.
pub const SCHEME: &str = "s3a://";

/// Separator between the bucket and the key, and inside keys.
pub const SEPARATOR: char = '/';

/// Errors produced while decomposing a logical path.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum LocationError {
    /// The path names a bucket but no object inside it.
    #[snafu(display("{path} is not a valid path for the file system: missing object key"))]
    EmptyKey {
        /// The offending logical path.
        path: String,
    },

    /// The path has no bucket component (for example `s3a:////key`).
    #[snafu(display("{path} is not a valid path for the file system: missing bucket"))]
    EmptyBucket {
        /// The offending logical path.
        path: String,
    },
}

/// A resolved object address: bucket plus non-empty key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectLocation {
    bucket: String,
    key: String,
}

impl ObjectLocation {
    /// Build a location from parts, enforcing the same invariants as [`resolve`].
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, LocationError> {
        let bucket = bucket.into();
        let key = key.into();
        if bucket.is_empty() {
            return EmptyBucketSnafu {
                path: format!("{SCHEME}{SEPARATOR}{key}"),
            }
            .fail();
        }
        if key.is_empty() {
            return EmptyKeySnafu {
                path: format!("{SCHEME}{bucket}"),
            }
            .fail();
        }
        Ok(Self { bucket, key })
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key inside the bucket.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Render back into a logical path with the `s3a://` scheme.
    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}{SEPARATOR}{}", self.bucket, self.key)
    }
}

/// Decompose a logical path into an [`ObjectLocation`].
///
/// Steps, in order:
/// 1. strip a literal leading `s3a://`;
/// 2. trim surrounding whitespace;
/// 3. drop exactly one leading `/`;
/// 4. split at the first remaining `/` into bucket and key.
///
/// A path with no separator after the bucket resolves to an empty key and
/// fails with [`LocationError::EmptyKey`].
pub fn resolve(path: &str) -> Result<ObjectLocation, LocationError> {
    let (bucket, key) = split(path);

    ensure!(!key.is_empty(), EmptyKeySnafu { path });
    ensure!(!bucket.is_empty(), EmptyBucketSnafu { path });

    Ok(ObjectLocation {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

/// A listing scope: a bucket plus a key prefix that may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPrefix {
    bucket: String,
    prefix: String,
}

impl ObjectPrefix {
    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix; empty when the whole bucket is in scope.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for ObjectPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}{SEPARATOR}{}", self.bucket, self.prefix)
    }
}

/// Decompose a path used as a listing prefix.
///
/// Same steps as [`resolve`], but the key may be empty: `s3a://bucket1` and
/// `s3a://bucket1/` both scope the listing to the whole bucket. The bucket is
/// still required.
pub fn resolve_prefix(path: &str) -> Result<ObjectPrefix, LocationError> {
    let (bucket, prefix) = split(path);

    ensure!(!bucket.is_empty(), EmptyBucketSnafu { path });

    Ok(ObjectPrefix {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
    })
}

fn split(path: &str) -> (&str, &str) {
    let rest = path.strip_prefix(SCHEME).unwrap_or(path).trim();
    let rest = rest.strip_prefix(SEPARATOR).unwrap_or(rest);
    rest.split_once(SEPARATOR).unwrap_or((rest, ""))
}
