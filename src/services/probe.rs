//! Aspect-ratio classification backed by `ffprobe`.

use crate::{
    models::media::AspectCategory,
    services::process::{ToolError, run_tool},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{ffi::OsStr, path::Path, time::Duration};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("unreadable probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("probe reported no stream with index 0")]
    NoPrimaryStream,
    #[error("primary stream has no usable dimensions")]
    MissingDimensions,
}

/// Inspects a local media file and reports its orientation.
#[async_trait]
pub trait AspectClassifier: Send + Sync {
    async fn classify(&self, path: &Path) -> Result<AspectCategory, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    width: Option<u32>,
    height: Option<u32>,
}

/// Map raw `ffprobe -print_format json -show_streams` output to a category.
///
/// Only the stream at index 0 is considered. Output with no streams, no
/// index-0 stream, or a primary stream without a positive width and height
/// is an error rather than `Other`.
pub fn classify_probe_output(stdout: &[u8]) -> Result<AspectCategory, ProbeError> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = output
        .streams
        .iter()
        .find(|stream| stream.index == 0)
        .ok_or(ProbeError::NoPrimaryStream)?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 => (width, height),
        _ => return Err(ProbeError::MissingDimensions),
    };

    let category =
        AspectCategory::from_dimensions(width, height).ok_or(ProbeError::MissingDimensions)?;
    debug!(width, height, %category, "classified primary stream");
    Ok(category)
}

/// `AspectClassifier` that shells out to `ffprobe`.
#[derive(Clone, Debug)]
pub struct FfprobeClassifier {
    program: String,
    timeout: Duration,
}

impl FfprobeClassifier {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AspectClassifier for FfprobeClassifier {
    async fn classify(&self, path: &Path) -> Result<AspectCategory, ProbeError> {
        let output = run_tool(
            &self.program,
            [
                OsStr::new("-v"),
                OsStr::new("error"),
                OsStr::new("-print_format"),
                OsStr::new("json"),
                OsStr::new("-show_streams"),
                path.as_os_str(),
            ],
            self.timeout,
        )
        .await?;
        classify_probe_output(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDSCAPE_PROBE: &str = r#"{
        "streams": [
            { "index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080 },
            { "index": 1, "codec_type": "audio", "codec_name": "aac", "sample_rate": "48000" }
        ]
    }"#;

    #[test]
    fn landscape_output_is_classified() {
        assert_eq!(
            classify_probe_output(LANDSCAPE_PROBE.as_bytes()).unwrap(),
            AspectCategory::Landscape
        );
    }

    #[test]
    fn picks_index_zero_regardless_of_listed_order() {
        let probe = r#"{"streams": [
            { "index": 1, "codec_type": "video", "width": 640, "height": 480 },
            { "index": 0, "codec_type": "video", "width": 1080, "height": 1920 }
        ]}"#;
        assert_eq!(
            classify_probe_output(probe.as_bytes()).unwrap(),
            AspectCategory::Portrait
        );
    }

    #[test]
    fn unusual_ratio_is_other() {
        let probe = r#"{"streams": [{ "index": 0, "width": 1440, "height": 1080 }]}"#;
        assert_eq!(
            classify_probe_output(probe.as_bytes()).unwrap(),
            AspectCategory::Other
        );
    }

    #[test]
    fn empty_stream_list_is_an_error() {
        assert!(matches!(
            classify_probe_output(br#"{"streams": []}"#),
            Err(ProbeError::NoPrimaryStream)
        ));
        assert!(matches!(
            classify_probe_output(b"{}"),
            Err(ProbeError::NoPrimaryStream)
        ));
    }

    #[test]
    fn audio_only_primary_stream_is_an_error() {
        let probe = r#"{"streams": [{ "index": 0, "codec_type": "audio", "sample_rate": "44100" }]}"#;
        assert!(matches!(
            classify_probe_output(probe.as_bytes()),
            Err(ProbeError::MissingDimensions)
        ));
    }

    #[test]
    fn zero_dimensions_are_an_error() {
        for probe in [
            r#"{"streams": [{ "index": 0, "width": 0, "height": 1080 }]}"#,
            r#"{"streams": [{ "index": 0, "width": 1920, "height": 0 }]}"#,
        ] {
            assert!(matches!(
                classify_probe_output(probe.as_bytes()),
                Err(ProbeError::MissingDimensions)
            ));
        }
    }

    #[test]
    fn garbage_output_is_a_parse_error() {
        assert!(matches!(
            classify_probe_output(b"Invalid data found when processing input"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_ffprobe(dir: &Path, script: &str) -> String {
            let path = dir.join("ffprobe");
            std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[tokio::test]
        async fn classifies_what_the_tool_prints() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_ffprobe(
                dir.path(),
                &format!("cat <<'JSON'\n{LANDSCAPE_PROBE}\nJSON"),
            );
            let classifier = FfprobeClassifier::new(program, Duration::from_secs(5));
            let category = classifier
                .classify(&dir.path().join("clip.mp4"))
                .await
                .unwrap();
            assert_eq!(category, AspectCategory::Landscape);
        }

        #[tokio::test]
        async fn non_zero_exit_is_a_probe_error() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_ffprobe(
                dir.path(),
                "echo 'Invalid data found when processing input' >&2\nexit 1",
            );
            let classifier = FfprobeClassifier::new(program, Duration::from_secs(5));
            let err = classifier
                .classify(&dir.path().join("corrupt.mp4"))
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::Tool(ToolError::Failed { .. })));
        }

        #[tokio::test]
        async fn stalled_probe_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_ffprobe(dir.path(), "sleep 10");
            let classifier = FfprobeClassifier::new(program, Duration::from_millis(100));
            let err = classifier
                .classify(&dir.path().join("clip.mp4"))
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::Tool(ToolError::TimedOut { .. })));
        }
    }
}
