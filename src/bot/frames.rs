//! Frame extraction for videos, animations and video stickers.
//!
//! Runs ffmpeg on the downloaded file and collects the stills it writes.
//! The classification gate then samples at most `max_frames` of them.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::FetchError;

/// Default decode timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Stills per second of playback handed to the gate.
const FRAMES_PER_SECOND: u32 = 2;

/// Hard cap on stills written for one file.
const MAX_DECODED_FRAMES: usize = 240;

/// Characters of stderr kept for error messages.
const MAX_STDERR: usize = 2048;

const FRAME_PREFIX: &str = "frame_";

#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FrameExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the decode timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Decode `media` into PNG stills in playback order.
    pub async fn extract(&self, media: &[u8]) -> Result<Vec<Vec<u8>>, FetchError> {
        let workdir = tempfile::tempdir().map_err(decode_error)?;
        let input = workdir.path().join("input");
        tokio::fs::write(&input, media).await.map_err(decode_error)?;

        self.run_ffmpeg(&input, workdir.path()).await?;

        let frames = read_frames(workdir.path()).await?;
        if frames.is_empty() {
            return Err(FetchError::Decode("no frames decoded".into()));
        }
        debug!("Decoded {} frames from {} bytes", frames.len(), media.len());
        Ok(frames)
    }

    async fn run_ffmpeg(&self, input: &Path, out_dir: &Path) -> Result<(), FetchError> {
        let pattern = out_dir.join(format!("{}%04d.png", FRAME_PREFIX));
        let filter = format!("fps={},scale='min(512,iw)':-2", FRAMES_PER_SECOND);
        let max_frames = MAX_DECODED_FRAMES.to_string();

        // Dropped on timeout, which kills the process.
        let child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(input)
            .arg("-vf")
            .arg(&filter)
            .arg("-frames:v")
            .arg(&max_frames)
            .arg(&pattern)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Decode(format!("failed to spawn ffmpeg: {}", e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(decode_error)?,
            Err(_) => {
                return Err(FetchError::Decode(format!(
                    "ffmpeg timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR)
                .collect();
            return Err(FetchError::Decode(format!(
                "ffmpeg exited with {}: {}",
                output.status, stderr
            )));
        }
        Ok(())
    }
}

/// Read the stills ffmpeg wrote, sorted by frame number.
async fn read_frames(dir: &Path) -> Result<Vec<Vec<u8>>, FetchError> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(decode_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(decode_error)? {
        let path = entry.path();
        let is_frame = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FRAME_PREFIX));
        if is_frame {
            paths.push(path);
        }
    }
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths.into_iter().take(MAX_DECODED_FRAMES) {
        frames.push(tokio::fs::read(&path).await.map_err(decode_error)?);
    }
    Ok(frames)
}

fn decode_error(e: std::io::Error) -> FetchError {
    FetchError::Decode(e.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Write an executable stand-in for ffmpeg. The output pattern is its
    /// last argument.
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ffmpeg");
        let script = format!(
            "#!/bin/sh\nfor last; do :; done\nout=$(dirname \"$last\")\n{}\n",
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn collects_frames_in_order() {
        let bin = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            bin.path(),
            "printf two > \"$out/frame_0002.png\"\n\
             printf one > \"$out/frame_0001.png\"\n\
             printf three > \"$out/frame_0003.png\"",
        );

        let frames = FrameExtractor::new(ffmpeg).extract(b"webm").await.unwrap();

        assert_eq!(
            frames,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[tokio::test]
    async fn input_file_is_not_a_frame() {
        let bin = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "printf a > \"$out/frame_0001.png\"");

        let frames = FrameExtractor::new(ffmpeg)
            .extract(b"frame_like_input")
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn failed_decode_is_an_error() {
        let bin = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "echo 'invalid data' >&2\nexit 1");

        let err = FrameExtractor::new(ffmpeg).extract(b"junk").await.unwrap_err();
        match err {
            FetchError::Decode(msg) => assert!(msg.contains("invalid data")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_output_is_an_error() {
        let bin = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "exit 0");

        let err = FrameExtractor::new(ffmpeg).extract(b"empty").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let err = FrameExtractor::new("/nonexistent/ffmpeg")
            .extract(b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_decode_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "sleep 5");

        let err = FrameExtractor::new(ffmpeg)
            .with_timeout(Duration::from_millis(100))
            .extract(b"x")
            .await
            .unwrap_err();
        match err {
            FetchError::Decode(msg) => assert!(msg.contains("timed out")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
