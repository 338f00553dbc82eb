//! Upload ingestion: stage → remux → classify → publish → record.
//!
//! Each call to [`UploadPipeline::ingest`] is independent. The raw upload and
//! the remuxed file are both [`StagedFile`]s owned by the call, so they are
//! deleted exactly once however the call ends, including when the request
//! future is dropped mid-way.

use crate::{
    models::{media::StorageReference, video::Video},
    services::{
        keys::{file_extension, route_key},
        probe::{AspectClassifier, ProbeError},
        publisher::{ObjectPublisher, TransferError},
        remux::{Normalizer, RemuxError},
        staging::StagedFile,
        video_store::{StoreError, VideoStore},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{fmt, io, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Multipart field carrying the video bytes.
pub const VIDEO_FORM_FIELD: &str = "video";

const ALLOWED_VIDEO_TYPES: [&str; 1] = ["video/mp4"];
const STAGED_PREFIX: &str = "video-ingest";
const STAGED_EXT: &str = ".mp4";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unparseable content type `{0}`")]
    UnparseableContentType(String),
    #[error("content type `{0}` is not allowed")]
    DisallowedContentType(String),
}

/// Accept only the supported video MIME type; parameters are dropped.
pub fn validate_video_content_type(raw: &str) -> Result<String, ValidationError> {
    let parsed: mime::Mime = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::UnparseableContentType(raw.to_string()))?;
    let essence = parsed.essence_str().to_ascii_lowercase();
    if ALLOWED_VIDEO_TYPES.contains(&essence.as_str()) {
        Ok(essence)
    } else {
        Err(ValidationError::DisallowedContentType(essence))
    }
}

/// One inbound upload: declared metadata plus the byte stream.
pub struct UploadRequest<S> {
    pub content_type: String,
    pub file_name: String,
    pub body: S,
}

/// Pipeline step at which an ingest failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Stage,
    Normalize,
    Classify,
    Publish,
    Record,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validate => "validate",
            Stage::Stage => "stage",
            Stage::Normalize => "normalize",
            Stage::Classify => "classify",
            Stage::Publish => "publish",
            Stage::Record => "record",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid upload: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to stage upload: {0}")]
    Staging(#[source] io::Error),
    #[error("fast-start remux failed: {0}")]
    Remux(#[from] RemuxError),
    #[error("aspect probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("publish failed: {0}")]
    Transfer(#[from] TransferError),
    /// The object is stored but no record points at it.
    #[error("published `{reference}` but failed to record it: {source}")]
    Record {
        reference: StorageReference,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation(_) => Stage::Validate,
            PipelineError::Staging(_) => Stage::Stage,
            PipelineError::Remux(_) => Stage::Normalize,
            PipelineError::Probe(_) => Stage::Classify,
            PipelineError::Transfer(_) => Stage::Publish,
            PipelineError::Record { .. } => Stage::Record,
        }
    }
}

#[derive(Clone)]
pub struct UploadPipeline {
    normalizer: Arc<dyn Normalizer>,
    classifier: Arc<dyn AspectClassifier>,
    publisher: Arc<dyn ObjectPublisher>,
    videos: Arc<dyn VideoStore>,
    bucket: String,
    temp_dir: PathBuf,
}

impl UploadPipeline {
    pub fn new(
        normalizer: Arc<dyn Normalizer>,
        classifier: Arc<dyn AspectClassifier>,
        publisher: Arc<dyn ObjectPublisher>,
        videos: Arc<dyn VideoStore>,
        bucket: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            normalizer,
            classifier,
            publisher,
            videos,
            bucket: bucket.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Process one upload for `video` and return the updated record.
    ///
    /// Nothing touches disk until the content type is accepted. A reference
    /// is written to the record only after the publisher confirms the
    /// transfer. If that final write fails the object stays in the store;
    /// the error carries its reference and the orphan is logged.
    pub async fn ingest<S>(
        &self,
        mut video: Video,
        upload: UploadRequest<S>,
    ) -> Result<Video, PipelineError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let content_type = validate_video_content_type(&upload.content_type)?;
        let ext = file_extension(&upload.file_name).to_string();

        let staged = self
            .stage(upload.body)
            .await
            .map_err(PipelineError::Staging)?;
        debug!(video_id = %video.id, path = %staged.path().display(), "staged upload");

        let normalized = self.normalizer.normalize(staged.path()).await?;
        debug!(video_id = %video.id, path = %normalized.path().display(), "normalized upload");

        let category = self.classifier.classify(normalized.path()).await?;
        let key = route_key(category, &ext);
        debug!(video_id = %video.id, %category, %key, "classified upload");

        self.publisher
            .publish(&self.bucket, &key, normalized.path(), &content_type)
            .await?;
        let reference = StorageReference::new(self.bucket.clone(), key);

        video.video_url = Some(reference.to_string());
        video.updated_at = Utc::now();
        if let Err(source) = self.videos.update(&video).await {
            error!(
                video_id = %video.id,
                bucket = %reference.bucket,
                key = %reference.key,
                error = %source,
                "object published but reference not recorded; orphaned object left in store"
            );
            return Err(PipelineError::Record { reference, source });
        }

        info!(video_id = %video.id, bucket = %reference.bucket, key = %reference.key, "video published");
        release(normalized).await;
        release(staged).await;
        Ok(video)
    }

    /// Copy the inbound stream into a fresh file under the temp directory.
    async fn stage<S>(&self, body: S) -> io::Result<StagedFile>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let (staged, mut file) =
            StagedFile::create(&self.temp_dir, STAGED_PREFIX, STAGED_EXT).await?;
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(staged)
    }
}

async fn release(file: StagedFile) {
    let path = file.path().to_path_buf();
    if let Err(err) = file.release().await {
        warn!("failed to remove {}: {}", path.display(), err);
    }
}
