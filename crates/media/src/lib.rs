//! Subprocess boundary around the external muxer (ffmpeg/ffprobe).
//!
//! Every invocation is an explicit argument vector, never a shell string.
//! Paths are validated before they reach a command line, and every child
//! process runs under a wall-clock deadline and is killed on expiry.

mod error;
mod path;
mod probe;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

pub use error::MediaError;
pub use path::validate_media_path;
pub use probe::probe_duration_secs;

const STDERR_HEAD: usize = 500;

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".into(),
            ffprobe_bin: "ffprobe".into(),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Media {
    config: MediaConfig,
}

impl Media {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Media duration in seconds via ffprobe.
    pub async fn duration_secs(&self, path: &Path) -> Result<f64, MediaError> {
        path::validate_media_path(path, true)?;
        probe::probe_duration_secs(&self.config, path).await
    }

    /// Extract the audio track as 16 kHz mono PCM WAV, the format the
    /// transcription engines expect.
    pub async fn extract_audio(&self, video: &Path, out: &Path) -> Result<(), MediaError> {
        path::validate_media_path(video, true)?;
        path::validate_media_path(out, false)?;
        ensure_parent(out).await?;

        self.run_ffmpeg(&[
            os(video),
            "-vn".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            "-ar".into(),
            "16000".into(),
            "-ac".into(),
            "1".into(),
            os(out),
        ])
        .await
    }

    /// Mux the dubbed track onto the original video, preserving the full
    /// video duration: shorter audio is padded with silence, longer audio
    /// is trimmed at the video tail.
    pub async fn merge(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), MediaError> {
        path::validate_media_path(video, true)?;
        path::validate_media_path(audio, true)?;
        path::validate_media_path(out, false)?;
        ensure_parent(out).await?;

        let video_duration = self.duration_secs(video).await?;
        tracing::info!(video_secs = video_duration, "merge_plain");

        self.run_ffmpeg(&[
            os(video),
            "-i".into(),
            os(audio),
            "-c:v".into(),
            "copy".into(),
            "-af".into(),
            "apad".into(),
            "-c:a".into(),
            "aac".into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-t".into(),
            format!("{video_duration:.3}"),
            os(out),
        ])
        .await
    }

    /// Mux for the stretch sync mode: when the dubbed track outlasts the
    /// video, the video is slowed by `audio/video` so nothing is cut.
    /// Falls back to a plain padded merge when the audio already fits.
    pub async fn merge_stretch(
        &self,
        video: &Path,
        audio: &Path,
        out: &Path,
    ) -> Result<(), MediaError> {
        path::validate_media_path(video, true)?;
        path::validate_media_path(audio, true)?;
        path::validate_media_path(out, false)?;
        ensure_parent(out).await?;

        let video_duration = self.duration_secs(video).await?;
        let audio_duration = self.duration_secs(audio).await?;
        if video_duration <= 0.0 || audio_duration <= 0.0 {
            return Err(MediaError::DurationUnavailable {
                path: video.display().to_string(),
            });
        }

        if audio_duration <= video_duration {
            return self.merge(video, audio, out).await;
        }

        let factor = audio_duration / video_duration;
        tracing::info!(
            video_secs = video_duration,
            audio_secs = audio_duration,
            factor,
            "merge_stretch"
        );

        self.run_ffmpeg(&[
            os(video),
            "-i".into(),
            os(audio),
            "-filter:v".into(),
            format!("setpts={factor:.6}*PTS"),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-crf".into(),
            "23".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-t".into(),
            format!("{audio_duration:.3}"),
            os(out),
        ])
        .await
    }

    /// Run ffmpeg with `-y -i <args...>` under the configured deadline.
    async fn run_ffmpeg(&self, tail: &[String]) -> Result<(), MediaError> {
        let mut cmd = Command::new(&self.config.ffmpeg_bin);
        cmd.arg("-y").arg("-i").args(tail);
        run_to_completion(cmd, &self.config.ffmpeg_bin, self.config.timeout).await
    }
}

fn os(path: &Path) -> String {
    path.display().to_string()
}

async fn ensure_parent(path: &Path) -> Result<(), MediaError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

async fn run_to_completion(
    mut cmd: Command,
    tool: &str,
    timeout: Duration,
) -> Result<(), MediaError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MediaError::BinaryMissing { tool: tool.to_string() }
        } else {
            MediaError::Io(e)
        }
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        // kill_on_drop reaps the child when the future is dropped here.
        Err(_) => {
            return Err(MediaError::Timeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let head: String = stderr.chars().take(STDERR_HEAD).collect();
        return Err(MediaError::CommandFailed {
            tool: tool.to_string(),
            stderr: head,
        });
    }
    Ok(())
}
