use log::{debug, info};

use crate::location::ObjectLocation;
use crate::store::{ObjectStoreClient, StoreResult};

/// Delete the version of `location` that is current at call time.
///
/// The version id comes from a HEAD immediately before the delete, so an
/// object written concurrently after the HEAD survives. Objects without a
/// version id are deleted through the `"null"` version. An object that is
/// already gone, whether at HEAD time or at delete time, counts as deleted.
pub(crate) async fn delete_current_version(
    client: &dyn ObjectStoreClient,
    location: &ObjectLocation,
) -> StoreResult<()> {
    let (bucket, key) = (location.bucket(), location.key());

    let head = match client.head_object(bucket, key).await {
        Ok(head) => head,
        Err(err) if err.is_not_found() => {
            info!("delete of {location}: object does not exist, nothing to do");
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    debug!("DeleteObjectVersion {bucket}/{key} version {}", head.version);
    match client
        .delete_object_version(bucket, key, &head.version)
        .await
    {
        Err(err) if err.is_not_found() => {
            info!("delete of {location}: object vanished before delete, nothing to do");
            Ok(())
        }
        other => other,
    }
}
