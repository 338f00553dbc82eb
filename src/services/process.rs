//! Bounded execution of external media tools (ffmpeg, ffprobe).
//!
//! Each call spawns exactly one child with stdin closed and both output
//! streams captured. The child is killed if the timeout elapses or if the
//! awaiting future is dropped, so a cancelled request never leaves a tool
//! running in the background.

use std::{
    ffi::OsStr,
    io,
    process::{ExitStatus, Output, Stdio},
    time::Duration,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Run `program` to completion and return its captured output.
///
/// A non-zero exit status is an error; stdout of a successful run is
/// returned untouched for the caller to parse.
pub async fn run_tool<I, S>(program: &str, args: I, timeout: Duration) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    debug!(program, pid = child.id(), "spawned external tool");

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?,
        // Dropping the wait future drops the child, which kills it.
        Err(_) => {
            return Err(ToolError::TimedOut {
                program: program.to_string(),
                timeout,
            });
        }
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: stderr_excerpt(&output.stderr),
        });
    }

    Ok(output)
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT_LEN {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_EXCERPT_LEN;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_stdout_of_successful_run() {
        let output = run_tool("sh", ["-c", "printf hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run_tool(
            "sh",
            ["-c", "echo 'moov atom not found' >&2; exit 3"],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        match err {
            ToolError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "moov atom not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_tool_times_out() {
        let err = run_tool("sleep", ["10"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = run_tool(
            "/nonexistent/definitely-not-ffmpeg",
            ["-version"],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn long_stderr_keeps_the_tail() {
        let noisy = format!("{}END", "x".repeat(STDERR_EXCERPT_LEN * 2));
        let excerpt = stderr_excerpt(noisy.as_bytes());
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.ends_with("END"));
        assert_eq!(excerpt.len(), STDERR_EXCERPT_LEN + 3);
    }
}
