//! src/services/local_store.rs
//!
//! LocalObjectStore — a filesystem stand-in for S3 used in development and
//! tests. Payloads live at `base_path/{bucket}/{shard}/{shard}/{key}` with a
//! JSON sidecar (`{key}.meta.json`) holding content type, size and ETag.

use crate::{
    models::object::StoredObject,
    services::{
        publisher::{ObjectPublisher, TransferError},
        staging::StagedFile,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    ffi::OsString,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("corrupt object metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type LocalStoreResult<T> = Result<T, LocalStoreError>;

impl From<LocalStoreError> for TransferError {
    fn from(err: LocalStoreError) -> Self {
        match err {
            LocalStoreError::Io(err) => TransferError::Io(err),
            other => TransferError::InvalidAddress(other.to_string()),
        }
    }
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const META_SUFFIX: &str = ".meta.json";

#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> LocalStoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(LocalStoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") || key.ends_with(META_SUFFIX) {
            return Err(LocalStoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(LocalStoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format with S3-like rules: 3–63 characters of
    /// lowercase letters, digits, dots and hyphens, starting and ending with a
    /// letter or digit, and not shaped like an IPv4 address.
    fn ensure_bucket_name_safe(&self, name: &str) -> LocalStoreResult<()> {
        let invalid = |reason: &str| LocalStoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }
        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(bucket/key), keeping the number
    /// of entries per directory small.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.clone();
        path.push(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn meta_path(object_path: &Path) -> PathBuf {
        let mut name = OsString::from(object_path.as_os_str());
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    /// Stream bytes into `bucket/key`, replacing any previous object.
    ///
    /// Bytes go to a temporary file beside the destination, are fsynced, and
    /// are renamed into place only once the stream completes. An aborted or
    /// failed write leaves the previous object untouched.
    pub async fn write_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        stream: S,
    ) -> LocalStoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(bucket, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "object path missing parent directory")
        })?;
        fs::create_dir_all(&parent).await?;

        let (tmp, mut file) = StagedFile::create(&parent, ".tmp", "").await?;
        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        replace_file(tmp.path(), &file_path).await?;
        tmp.release().await?;

        let object = StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            etag: format!("{:x}", digest.compute()),
            last_modified: Utc::now(),
        };

        let (meta_tmp, mut meta_file) = StagedFile::create(&parent, ".tmp", META_SUFFIX).await?;
        meta_file.write_all(&serde_json::to_vec(&object)?).await?;
        meta_file.sync_all().await?;
        drop(meta_file);
        replace_file(meta_tmp.path(), &Self::meta_path(&file_path)).await?;
        meta_tmp.release().await?;

        debug!(bucket, key, size_bytes, "stored object {}", file_path.display());
        Ok(object)
    }

    /// Metadata plus an open handle ready for streaming out.
    pub async fn open_object(&self, bucket: &str, key: &str) -> LocalStoreResult<(StoredObject, File)> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;

        let not_found = || LocalStoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let file_path = self.object_path(bucket, key);

        let meta = match fs::read(Self::meta_path(&file_path)).await {
            Ok(raw) => serde_json::from_slice::<StoredObject>(&raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(err.into()),
        };
        let file = match File::open(&file_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(err.into()),
        };

        Ok((meta, file))
    }
}

#[async_trait]
impl ObjectPublisher for LocalObjectStore {
    async fn publish(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), TransferError> {
        let file = File::open(source)
            .await
            .map_err(|err| TransferError::Source {
                path: source.to_path_buf(),
                message: err.to_string(),
            })?;
        self.write_stream(bucket, key, content_type, ReaderStream::new(file))
            .await?;
        Ok(())
    }
}

/// Rename `from` over `to`, replacing an existing destination on platforms
/// where rename refuses to.
async fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(to).await?;
            fs::rename(from, to).await
        }
        Err(err) => Err(err),
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
