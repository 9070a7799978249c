use super::process::run_tool;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Turns downloaded audio into the WAV the segmenter and recognizer expect.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    async fn convert(&self, source: &Path, dest: &Path) -> Result<()>;
}

/// 16 kHz mono PCM via ffmpeg.
pub struct FfmpegConverter {
    ffmpeg: PathBuf,
}

impl FfmpegConverter {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn convert(&self, source: &Path, dest: &Path) -> Result<()> {
        log::debug!("Converting {:?} to WAV", source);
        run_tool(
            &self.ffmpeg,
            [
                OsStr::new("-nostdin"),
                OsStr::new("-y"),
                OsStr::new("-i"),
                source.as_os_str(),
                OsStr::new("-ar"),
                OsStr::new("16000"),
                OsStr::new("-ac"),
                OsStr::new("1"),
                OsStr::new("-c:a"),
                OsStr::new("pcm_s16le"),
                // staging names end in .partial, so name the container explicitly
                OsStr::new("-f"),
                OsStr::new("wav"),
                dest.as_os_str(),
            ],
        )
        .await
        .map_err(PipelineError::Conversion)?;

        let written = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(PipelineError::Conversion(format!(
                "ffmpeg produced no audio for {:?}",
                source
            )));
        }
        Ok(())
    }
}
