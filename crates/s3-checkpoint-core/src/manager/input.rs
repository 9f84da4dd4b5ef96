use std::io;

use bytes::{Buf, Bytes};

use crate::location::ObjectLocation;

/// Read handle over a checkpoint file fetched with [`open`].
///
/// The whole object is downloaded when the file is opened, so reads never
/// touch the store and always see one consistent version.
///
/// [`open`]: crate::manager::CheckpointFileManager::open
#[derive(Debug, Clone)]
pub struct CheckpointInput {
    location: ObjectLocation,
    data: Bytes,
}

impl CheckpointInput {
    pub(crate) fn new(location: ObjectLocation, data: Bytes) -> Self {
        Self { location, data }
    }

    /// The file this handle reads.
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// Bytes not yet consumed by [`io::Read`].
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consume the handle, returning the unread bytes.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl io::Read for CheckpointInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.remaining());
        self.data.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}
