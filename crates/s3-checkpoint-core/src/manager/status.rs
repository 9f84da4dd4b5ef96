use crate::location::ObjectLocation;
use crate::store::ObjectSummary;

/// Block size reported for every object (64 MiB).
///
/// Object stores have no block structure; hosts that size their reads by
/// block size get a constant.
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Replication factor reported for every object.
pub const DEFAULT_REPLICATION: u16 = 1;

/// Filesystem-style metadata for one listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Object size in bytes.
    pub size: u64,
    /// Always false: the store has no directories.
    pub is_directory: bool,
    /// Always [`DEFAULT_REPLICATION`].
    pub replication: u16,
    /// Always [`DEFAULT_BLOCK_SIZE`].
    pub block_size: u64,
    /// Last modification time in milliseconds since the Unix epoch.
    pub last_modified_millis: i64,
    /// Where the object lives.
    pub location: ObjectLocation,
}

impl FileStatus {
    /// The object rendered back as a logical path (`s3a://bucket/key`).
    pub fn path(&self) -> String {
        self.location.to_uri()
    }

    pub(crate) fn from_summary(summary: &ObjectSummary, location: ObjectLocation) -> Self {
        Self {
            size: summary.size,
            is_directory: false,
            replication: DEFAULT_REPLICATION,
            block_size: DEFAULT_BLOCK_SIZE,
            last_modified_millis: summary.last_modified.timestamp_millis(),
            location,
        }
    }
}

/// Caller predicate over listed files.
///
/// `list` accepts a filter but returns every object under the prefix; callers
/// that want filtering apply [`PathFilter::retain`] to the result.
pub trait PathFilter: Send + Sync {
    /// Whether `status` should be kept.
    fn accept(&self, status: &FileStatus) -> bool;

    /// Keep only the statuses this filter accepts.
    fn retain(&self, statuses: &mut Vec<FileStatus>) {
        statuses.retain(|status| self.accept(status));
    }
}

impl<F> PathFilter for F
where
    F: Fn(&FileStatus) -> bool + Send + Sync,
{
    fn accept(&self, status: &FileStatus) -> bool {
        self(status)
    }
}

/// Filter accepting every file.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl PathFilter for AcceptAll {
    fn accept(&self, _status: &FileStatus) -> bool {
        true
    }
}
