use super::process::run_tool;
use crate::config::SegmentationConfig;
use crate::error::{PipelineError, Result};
use crate::store::list_segments;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// A canonical WAV header with no samples behind it.
const EMPTY_WAV_LEN: u64 = 44;

/// Splits one episode's audio into speech segments at silences.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Fill the existing directory `dest_dir` with `.wav` segments and return
    /// how many were written.
    async fn split(&self, source: &Path, dest_dir: &Path) -> Result<usize>;
}

/// Silence splitting through sox's `silence ... : newfile : restart` chain.
pub struct SoxSegmenter {
    sox: PathBuf,
    min_silence_secs: f64,
    threshold: String,
}

impl SoxSegmenter {
    pub fn new(sox: impl Into<PathBuf>, config: &SegmentationConfig) -> Self {
        Self {
            sox: sox.into(),
            min_silence_secs: config.min_silence_secs,
            threshold: config.threshold.clone(),
        }
    }

    fn args(&self, source: &Path, dest_dir: &Path) -> Vec<OsString> {
        let silence = self.min_silence_secs.to_string();
        let mut args: Vec<OsString> = vec![
            source.as_os_str().to_owned(),
            dest_dir.join("chunk.wav").into_os_string(),
        ];
        for arg in [
            "silence",
            "1",
            silence.as_str(),
            self.threshold.as_str(),
            "1",
            silence.as_str(),
            self.threshold.as_str(),
            ":",
            "newfile",
            ":",
            "restart",
        ] {
            args.push(arg.into());
        }
        args
    }
}

#[async_trait]
impl Segmenter for SoxSegmenter {
    async fn split(&self, source: &Path, dest_dir: &Path) -> Result<usize> {
        log::debug!("Splitting {:?} on silence...", source);
        run_tool(&self.sox, self.args(source, dest_dir))
            .await
            .map_err(PipelineError::Segmentation)?;

        // The restart chain leaves a header-only file behind after trailing silence
        let mut kept = 0;
        for segment in list_segments(dest_dir)? {
            let len = tokio::fs::metadata(&segment).await.map(|m| m.len()).unwrap_or(0);
            if len <= EMPTY_WAV_LEN {
                tokio::fs::remove_file(&segment).await?;
            } else {
                kept += 1;
            }
        }

        if kept == 0 {
            return Err(PipelineError::Segmentation(format!(
                "no speech segments found in {:?}",
                source
            )));
        }
        log::debug!("Splitting complete: {} segments", kept);
        Ok(kept)
    }
}
