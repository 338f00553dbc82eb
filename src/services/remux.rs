//! Fast-start remuxing backed by `ffmpeg`.
//!
//! The remux copies audio and video bit for bit (`-c copy`) into an MP4
//! whose `moov` atom precedes the media data, so playback can begin before
//! the download completes.

use crate::services::{
    process::{ToolError, run_tool},
    staging::StagedFile,
};
use async_trait::async_trait;
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Suffix appended to the input path to name the remuxed output.
const OUTPUT_SUFFIX: &str = ".faststart";

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("remux output missing at {0}")]
    MissingOutput(PathBuf),
}

/// Rewrites a local video for progressive playback.
///
/// The output lives at a path distinct from the input and is owned by a
/// `StagedFile` from before the rewrite starts, so it is removed on failure,
/// on cancellation, or whenever the caller lets it go.
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, input: &Path) -> Result<StagedFile, RemuxError>;
}

/// Output path for a given input: the input path with `.faststart` appended.
pub fn faststart_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(OUTPUT_SUFFIX);
    PathBuf::from(name)
}

/// `Normalizer` that shells out to `ffmpeg`.
#[derive(Clone, Debug)]
pub struct FfmpegNormalizer {
    program: String,
    timeout: Duration,
}

impl FfmpegNormalizer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Normalizer for FfmpegNormalizer {
    async fn normalize(&self, input: &Path) -> Result<StagedFile, RemuxError> {
        let output = StagedFile::adopt(faststart_path(input));
        let args = [
            OsStr::new("-nostdin"),
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-y"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-c"),
            OsStr::new("copy"),
            OsStr::new("-movflags"),
            OsStr::new("faststart"),
            OsStr::new("-f"),
            OsStr::new("mp4"),
            output.path().as_os_str(),
        ];

        run_tool(&self.program, args, self.timeout).await?;

        if !fs::try_exists(output.path()).await.unwrap_or(false) {
            return Err(RemuxError::MissingOutput(output.path().to_path_buf()));
        }

        debug!(input = %input.display(), output = %output.path().display(), "remuxed for fast start");
        Ok(output)
    }
}
