use log::debug;
use snafu::prelude::*;

use crate::location::{ObjectLocation, ObjectPrefix};
use crate::manager::FileStatus;
use crate::store::{ObjectListing, ObjectStoreClient, ProtocolSnafu, StoreOperation, StoreResult};

/// Collect every object under `prefix` into file statuses, following
/// continuation pages until the store reports the listing complete.
///
/// Store order is preserved. Each call starts a fresh pagination session.
pub(crate) async fn list_all(
    client: &dyn ObjectStoreClient,
    prefix: &ObjectPrefix,
) -> StoreResult<Vec<FileStatus>> {
    let (bucket, key) = (prefix.bucket(), prefix.prefix());

    let mut page = client.list_objects(bucket, key).await?;
    let mut statuses = Vec::with_capacity(page.summaries.len());
    let mut pages = 1usize;
    collect_page(&page, &mut statuses);

    while page.truncated {
        ensure!(
            page.continuation.is_some(),
            ProtocolSnafu {
                operation: StoreOperation::ListNextBatch,
                bucket,
                message: format!("truncated listing of prefix {key} has no continuation token"),
            }
        );
        page = client.list_next_batch(&page).await?;
        pages += 1;
        collect_page(&page, &mut statuses);
    }

    debug!(
        "ListObjects {bucket}/{key}: {} objects in {pages} page(s)",
        statuses.len()
    );
    Ok(statuses)
}

fn collect_page(page: &ObjectListing, statuses: &mut Vec<FileStatus>) {
    statuses.extend(page.summaries.iter().filter_map(|summary| {
        // Keys are non-empty on any real store; skip anything that is not addressable.
        ObjectLocation::new(summary.bucket.as_str(), summary.key.as_str())
            .ok()
            .map(|location| FileStatus::from_summary(summary, location))
    }));
}
