//! Time-limited playback links for stored videos.
//!
//! Signed URLs are derived on every read and never persisted: a stored video
//! carries only its `bucket,key` reference.

use crate::models::{
    media::{MalformedReference, StorageReference},
    video::Video,
};
use async_trait::async_trait;
use aws_sdk_s3::{Client, error::DisplayErrorContext, presigning::PresigningConfig};
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of a playback link.
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(5 * 60);

/// Characters escaped in object keys embedded in local link paths. `/` is
/// kept so keys map onto the wildcard route.
const KEY_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid link lifetime {ttl:?}: {message}")]
    InvalidTtl { ttl: Duration, message: String },
    #[error("failed to sign `{bucket}/{key}`: {message}")]
    Signer {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Produces a URL granting temporary unauthenticated read access to one object.
#[async_trait]
pub trait LinkSigner: Send + Sync {
    async fn sign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, SigningError>;
}

/// Presigned S3 `GetObject` links.
#[derive(Clone, Debug)]
pub struct S3LinkSigner {
    client: Client,
}

impl S3LinkSigner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkSigner for S3LinkSigner {
    async fn sign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, SigningError> {
        let config = PresigningConfig::expires_in(ttl).map_err(|err| SigningError::InvalidTtl {
            ttl,
            message: err.to_string(),
        })?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| SigningError::Signer {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        Ok(request.uri().to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkRejected {
    #[error("link expired")]
    Expired,
    #[error("bad signature")]
    BadSignature,
}

/// HMAC-SHA256 links served by this process from the local object store.
///
/// Links look like `{base_url}/objects/{bucket}/{key}?expires=<unix>&signature=<hex>`
/// and are checked by [`LocalLinkSigner::verify`].
#[derive(Clone)]
pub struct LocalLinkSigner {
    base_url: String,
    secret: Vec<u8>,
}

impl LocalLinkSigner {
    pub fn new(base_url: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> HmacSha256 {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(format!("{}/{}\n{}", bucket, key, expires).as_bytes());
        mac
    }

    /// Check a presented link against the current time.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), LinkRejected> {
        let presented = hex::decode(signature).map_err(|_| LinkRejected::BadSignature)?;
        self.mac(bucket, key, expires)
            .verify_slice(&presented)
            .map_err(|_| LinkRejected::BadSignature)?;
        if expires < Utc::now().timestamp() {
            return Err(LinkRejected::Expired);
        }
        Ok(())
    }
}

#[async_trait]
impl LinkSigner for LocalLinkSigner {
    async fn sign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, SigningError> {
        let seconds = i64::try_from(ttl.as_secs()).map_err(|err| SigningError::InvalidTtl {
            ttl,
            message: err.to_string(),
        })?;
        let expires = Utc::now().timestamp() + seconds;
        let signature = hex::encode(self.mac(bucket, key, expires).finalize().into_bytes());

        Ok(format!(
            "{}/objects/{}/{}?expires={}&signature={}",
            self.base_url,
            bucket,
            utf8_percent_encode(key, KEY_PATH),
            expires,
            signature
        ))
    }
}

#[derive(Debug, Error)]
pub enum SignVideoError {
    #[error(transparent)]
    Malformed(#[from] MalformedReference),
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Replace a video's stored reference with a signed playback URL.
///
/// A video without a reference has nothing published yet and is returned
/// unchanged. The reference is parsed before the signer is called.
pub async fn sign_video(
    signer: &dyn LinkSigner,
    mut video: Video,
    ttl: Duration,
) -> Result<Video, SignVideoError> {
    let Some(stored) = video.video_url.as_deref() else {
        return Ok(video);
    };
    let reference: StorageReference = stored.parse()?;
    let url = signer.sign(&reference.bucket, &reference.key, ttl).await?;
    debug!(video_id = %video.id, bucket = %reference.bucket, key = %reference.key, "signed playback link");
    video.video_url = Some(url);
    Ok(video)
}
