//! Audio track extraction for video uploads
//!
//! Shells out to ffmpeg; the extracted track is written to a temporary
//! `.mp3` that is removed when its `TempPath` is dropped.

use async_trait::async_trait;
use std::path::Path;
use tempfile::TempPath;
use tokio::process::Command;

use super::ExtractError;

/// Video/audio capability: export the audio track of `video` to `output`
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), ExtractError>;
}

pub struct FfmpegAudioExtractor {
    program: String,
}

impl FfmpegAudioExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), ExtractError> {
        // first audio stream only, downmixed to mono
        let result = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(video)
            .args(["-vn", "-map", "0:a:0", "-ac", "1", "-codec:a", "libmp3lame", "-q:a", "4"])
            .arg(output)
            .output()
            .await
            .map_err(|e| ExtractError::Audio(format!("failed to run {}: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ExtractError::Audio(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Reserve a temporary path for the extracted audio track
pub fn temp_audio_path() -> Result<TempPath, ExtractError> {
    let file = tempfile::Builder::new()
        .prefix("smart-edu-audio-")
        .suffix(".mp3")
        .tempfile()?;
    Ok(file.into_temp_path())
}
