//! Object publication: moving a processed local file into durable storage.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::Region,
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use std::{io, path::{Path, PathBuf}};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot read `{}` for upload: {message}", .path.display())]
    Source { path: PathBuf, message: String },
    #[error("object store rejected `{bucket}/{key}`: {message}")]
    Rejected {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("invalid object address: {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes a local file to an object store under `bucket/key`.
///
/// Implementations stream the file rather than reading it into memory, and
/// overwrite any existing object at the same key.
#[async_trait]
pub trait ObjectPublisher: Send + Sync {
    async fn publish(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), TransferError>;
}

/// Build an S3 client from the default credential chain.
///
/// `endpoint` targets S3-compatible stores (MinIO, R2); those usually also
/// need path-style addressing.
pub async fn build_s3_client(region: &str, endpoint: Option<&str>, force_path_style: bool) -> Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(force_path_style)
        .build();

    info!(region, endpoint = endpoint.unwrap_or("default"), "configured S3 client");
    Client::from_conf(s3_config)
}

#[derive(Clone, Debug)]
pub struct S3Publisher {
    client: Client,
}

impl S3Publisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectPublisher for S3Publisher {
    async fn publish(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), TransferError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|err| TransferError::Source {
                path: source.to_path_buf(),
                message: err.to_string(),
            })?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| TransferError::Rejected {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        debug!(bucket, key, etag = output.e_tag().unwrap_or(""), "put object");
        Ok(())
    }
}
