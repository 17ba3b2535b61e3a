//! S3-compatible object store adapter
//!
//! Talks to MinIO, AWS S3 or any other S3-compatible service through
//! `aws-sdk-s3`. Uploads carry the local modification time as object
//! metadata so that `stat` can report it back; without it the store's own
//! upload timestamp would never match the local file.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{stream, StreamExt};
use minisync_core::config::StoreConfig;
use minisync_core::domain::LocalFileState;
use minisync_core::ports::{IObjectStoreClient, ObjectStream, RemoteObjectInfo, StoreError};
use tracing::{debug, info, instrument};

/// User metadata key holding the source file's modification time (RFC 3339).
pub const MTIME_METADATA_KEY: &str = "mtime";

/// Region that must not be sent as a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// S3-backed implementation of [`IObjectStoreClient`], bound to one bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    /// Build a client from static credentials and an explicit endpoint.
    ///
    /// SDK retries are disabled: a failed call surfaces immediately and is
    /// retried by the next reconciliation sweep instead.
    pub async fn connect(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "minisync-config",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(config.endpoint_url())
            .force_path_style(config.force_path_style)
            .build();

        Self::from_client(
            Client::from_conf(s3_config),
            config.bucket.clone(),
            config.region.clone(),
        )
    }

    /// Wrap a pre-configured client.
    pub fn from_client(client: Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn to_chrono(value: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

fn parse_mtime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_mtime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn clamp_size(size: Option<i64>) -> u64 {
    size.unwrap_or_default().max(0) as u64
}

#[async_trait]
impl IObjectStoreClient for S3ObjectStore {
    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        let create_err = match request.send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "Created bucket");
                return Ok(());
            }
            Err(e) => e,
        };

        if let Some(service_err) = create_err.as_service_error() {
            if service_err.is_bucket_already_owned_by_you() {
                debug!(bucket = %self.bucket, "Bucket already exists");
                return Ok(());
            }
        }

        // Creation can fail for reasons unrelated to existence (e.g. missing
        // s3:CreateBucket permission); the bucket is usable if it answers.
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "Bucket already exists");
                Ok(())
            }
            Err(_) => Err(StoreError::unavailable(
                "ensure_bucket",
                &self.bucket,
                DisplayErrorContext(&create_err),
            )),
        }
    }

    #[instrument(skip(self, local_path), fields(bucket = %self.bucket, path = %local_path.display()))]
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StoreError::unreadable(local_path, e))?;
        let state =
            LocalFileState::from_metadata(&metadata).map_err(|e| StoreError::unreadable(local_path, e))?;

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::unreadable(local_path, std::io::Error::other(e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type("application/octet-stream")
            .metadata(MTIME_METADATA_KEY, format_mtime(&state.modified))
            .send()
            .await
            .map_err(|e| StoreError::unavailable("put", key, DisplayErrorContext(&e)))?;

        debug!(key, size = state.size, "Stored object");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(ref service_err))
                if service_err.err().code() == Some("NoSuchKey") =>
            {
                debug!(key, "Object already absent");
                Ok(())
            }
            Err(e) => Err(StoreError::unavailable("delete", key, DisplayErrorContext(&e))),
        }
    }

    fn list(&self, prefix: &str) -> ObjectStream {
        let cursor = ListCursor {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            prefix: prefix.to_string(),
            continuation_token: None,
            buffered: VecDeque::new(),
            exhausted: false,
        };

        stream::try_unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(object) = cursor.buffered.pop_front() {
                    return Ok(Some((object, cursor)));
                }
                if cursor.exhausted {
                    return Ok(None);
                }
                if let Err(e) = cursor.fetch_page().await {
                    return Err(e);
                }
            }
        })
        .boxed()
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn stat(&self, key: &str) -> Result<Option<RemoteObjectInfo>, StoreError> {
        let output = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(ref service_err)) if service_err.err().is_not_found() => {
                return Ok(None);
            }
            Err(e) => return Err(StoreError::unavailable("stat", key, DisplayErrorContext(&e))),
        };

        let last_modified = output
            .metadata()
            .and_then(|m| m.get(MTIME_METADATA_KEY))
            .and_then(|v| parse_mtime(v))
            .or_else(|| output.last_modified().and_then(to_chrono))
            .unwrap_or_default();

        Ok(Some(RemoteObjectInfo {
            key: key.to_string(),
            size: clamp_size(output.content_length()),
            last_modified,
        }))
    }
}

/// Pagination state for one `list` call.
struct ListCursor {
    client: Client,
    bucket: String,
    prefix: String,
    continuation_token: Option<String>,
    buffered: VecDeque<RemoteObjectInfo>,
    exhausted: bool,
}

impl ListCursor {
    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let mut request = self.client.list_objects_v2().bucket(&self.bucket);
        if !self.prefix.is_empty() {
            request = request.prefix(&self.prefix);
        }
        if let Some(token) = &self.continuation_token {
            request = request.continuation_token(token);
        }

        let page = request
            .send()
            .await
            .map_err(|e| StoreError::unavailable("list", &self.prefix, DisplayErrorContext(&e)))?;

        for object in page.contents() {
            if let Some(key) = object.key() {
                self.buffered.push_back(RemoteObjectInfo {
                    key: key.to_string(),
                    size: clamp_size(object.size()),
                    last_modified: object
                        .last_modified()
                        .and_then(to_chrono)
                        .unwrap_or_default(),
                });
            }
        }

        self.continuation_token = if page.is_truncated().unwrap_or(false) {
            page.next_continuation_token().map(String::from)
        } else {
            None
        };
        self.exhausted = self.continuation_token.is_none();
        Ok(())
    }
}
