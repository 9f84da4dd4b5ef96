//! AWS SDK backed object store client.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, Ceph RGW, R2).
//! One [`S3ObjectStore`] wraps one SDK client, which pools connections and is
//! safe to share between concurrent callers.
//!
//! Uploads larger than the configured threshold are sent as a multipart
//! upload. The object only becomes visible when the upload is completed, and
//! any failing part aborts the upload, so readers never observe a partial
//! object either way.
//!
//! A put future dropped mid-upload (for example a cancelled `close`) never
//! reaches the abort, and the uploaded parts stay billed on the server until
//! something removes them. Readers are unaffected. Buckets used for
//! checkpoints should carry a lifecycle rule with
//! `AbortIncompleteMultipartUpload` (a day or so) to reclaim them.

use std::ops::Range;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region, SharedCredentialsProvider};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use snafu::{IntoError, prelude::*};

use crate::config::{ConfigError, CredentialSource, StoreConfig};
use crate::store::{
    BackendError, NotFoundSnafu, ObjectHead, ObjectListing, ObjectStoreClient, ObjectSummary,
    ObjectVersion, ProtocolSnafu, StoreError, StoreOperation, StoreResult, TransportSnafu,
};

const CREDENTIALS_PROVIDER_NAME: &str = "s3-checkpoint-static";

/// [`ObjectStoreClient`] on top of `aws-sdk-s3`.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    multipart_threshold: usize,
    part_size: usize,
}

impl S3ObjectStore {
    /// Build a client from `config`.
    ///
    /// Static credentials are wrapped as-is; the default chain is resolved
    /// once here and shared by every request the client makes. No request is
    /// sent to the service.
    pub async fn connect(config: &StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let region = Region::new(config.region.clone());
        let credentials = match &config.credentials {
            CredentialSource::Static {
                access_key,
                secret_key,
            } => SharedCredentialsProvider::new(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                CREDENTIALS_PROVIDER_NAME,
            )),
            CredentialSource::StaticSession {
                access_key,
                secret_key,
                session_token,
            } => SharedCredentialsProvider::new(Credentials::new(
                access_key,
                secret_key,
                Some(session_token.clone()),
                None,
                CREDENTIALS_PROVIDER_NAME,
            )),
            CredentialSource::DefaultChain => SharedCredentialsProvider::new(
                DefaultCredentialsChain::builder()
                    .region(region.clone())
                    .build()
                    .await,
            ),
        };

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            .endpoint_url(&config.endpoint)
            .force_path_style(config.path_style_access)
            .build();

        debug!(
            "built S3 client for {} (region {}, path style {}, credentials {:?})",
            config.endpoint, config.region, config.path_style_access, config.credentials
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            multipart_threshold: config.multipart_threshold,
            part_size: config.multipart_part_size,
        })
    }

    /// Wrap an existing SDK client, using the default multipart settings.
    pub fn from_client(client: Client) -> Self {
        let defaults = StoreConfig::default();
        Self {
            client,
            multipart_threshold: defaults.multipart_threshold,
            part_size: defaults.multipart_part_size,
        }
    }

    /// The underlying SDK client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn list_page(
        &self,
        operation: StoreOperation,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StoreResult<ObjectListing> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, operation, bucket, prefix))?;

        let summaries = output
            .contents()
            .iter()
            .map(|object| ObjectSummary {
                bucket: bucket.to_string(),
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().unwrap_or(0).max(0) as u64,
                last_modified: object
                    .last_modified()
                    .map(to_utc)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            })
            .collect();

        Ok(ObjectListing {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            summaries,
            truncated: output.is_truncated().unwrap_or(false),
            continuation: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> StoreResult<ObjectVersion> {
        let operation = StoreOperation::PutObject;
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, operation, bucket, key))?;

        let upload_id = created
            .upload_id()
            .context(ProtocolSnafu {
                operation,
                bucket,
                message: "CreateMultipartUpload returned no upload id",
            })?
            .to_string();

        debug!(
            "multipart upload {upload_id} for {bucket}/{key}: {} bytes in parts of {}",
            data.len(),
            self.part_size
        );

        match self.upload_parts(bucket, key, &upload_id, data).await {
            Ok(version) => Ok(version),
            Err(err) => {
                // An aborted upload never becomes visible.
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("failed to abort multipart upload {upload_id} for {bucket}/{key}: {abort}");
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        data: Bytes,
    ) -> StoreResult<ObjectVersion> {
        let operation = StoreOperation::PutObject;
        let mut parts = Vec::with_capacity(data.len().div_ceil(self.part_size.max(1)));

        for (index, range) in part_ranges(data.len(), self.part_size).enumerate() {
            // S3 numbers parts from 1 and caps them at 10,000.
            let part_number = (index + 1) as i32;
            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.slice(range)))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, operation, bucket, key))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(e, operation, bucket, key))?;

        Ok(ObjectVersion::from_optional(completed.version_id()))
    }
}

/// Whether a payload of `len` bytes goes through a multipart upload.
/// A payload of exactly `threshold` bytes is still a single put.
fn uses_multipart(len: usize, threshold: usize) -> bool {
    len > threshold
}

/// Byte ranges of each part, in part-number order. Every part but the last
/// is exactly `part_size` bytes.
fn part_ranges(len: usize, part_size: usize) -> impl Iterator<Item = Range<usize>> {
    let step = part_size.max(1);
    (0..len)
        .step_by(step)
        .map(move |start| start..(start + step).min(len))
}

fn to_utc(ts: &S3DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()).unwrap_or(DateTime::UNIX_EPOCH)
}

fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

/// Classify an SDK failure: HTTP 404 becomes `NotFound`, everything else is
/// a transport error carrying the SDK error as its source.
fn map_sdk_error<E>(
    err: SdkError<E, HttpResponse>,
    operation: StoreOperation,
    bucket: &str,
    key: &str,
) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if is_not_found(&err) {
        return NotFoundSnafu { bucket, key }.build();
    }
    TransportSnafu {
        operation,
        bucket,
        key,
    }
    .into_error(BackendError::S3(Box::new(err)))
}

/// Turn a HEAD result into an existence answer: 404 means absent, any other
/// failure is an error.
fn exists_from<T, E>(
    head: Result<T, SdkError<E, HttpResponse>>,
    bucket: &str,
    key: &str,
) -> StoreResult<bool>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match head {
        Ok(_) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(map_sdk_error(e, StoreOperation::ObjectExists, bucket, key)),
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<ObjectListing> {
        self.list_page(StoreOperation::ListObjects, bucket, prefix, None)
            .await
    }

    async fn list_next_batch(&self, previous: &ObjectListing) -> StoreResult<ObjectListing> {
        let token = previous.continuation.clone().context(ProtocolSnafu {
            operation: StoreOperation::ListNextBatch,
            bucket: previous.bucket.as_str(),
            message: "listing has no continuation token",
        })?;
        self.list_page(
            StoreOperation::ListNextBatch,
            &previous.bucket,
            &previous.prefix,
            Some(token),
        )
        .await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> StoreResult<ObjectVersion> {
        if uses_multipart(data.len(), self.multipart_threshold) {
            return self.put_multipart(bucket, key, data).await;
        }

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, StoreOperation::PutObject, bucket, key))?;

        Ok(ObjectVersion::from_optional(output.version_id()))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, StoreOperation::GetObject, bucket, key))?;

        let data = output.body.collect().await.map_err(|e| {
            TransportSnafu {
                operation: StoreOperation::GetObject,
                bucket,
                key,
            }
            .into_error(BackendError::S3(Box::new(e)))
        })?;

        Ok(data.into_bytes())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, StoreOperation::HeadObject, bucket, key))?;

        Ok(ObjectHead {
            size: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: output
                .last_modified()
                .map(to_utc)
                .unwrap_or(DateTime::UNIX_EPOCH),
            version: ObjectVersion::from_optional(output.version_id()),
        })
    }

    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version: &ObjectVersion,
    ) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .version_id(version.as_str())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, StoreOperation::DeleteObjectVersion, bucket, key))?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let head = self.client.head_object().bucket(bucket).key(key).send().await;
        exists_from(head, bucket, key)
    }
}
