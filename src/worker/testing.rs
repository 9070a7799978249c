//! In-process stand-ins for the external tools.
//!
//! The "audio" is plain text: the downloader writes the scripted speech for a
//! locator, conversion copies it, segmentation copies it into one segment and
//! recognition reads it back. Locators starting with `fail://`, `hang://` or
//! `panic://` make the download fail, never finish or panic.

use super::analyze::CitationExtractor;
use super::convert::AudioConverter;
use super::download::Downloader;
use super::segment::Segmenter;
use super::transcribe::Recognizer;
use super::Collaborators;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recognizer output that counts as unintelligible.
pub const NOISE: &str = "rauschen";

#[derive(Default)]
pub struct FakeTools {
    speech: HashMap<String, String>,
    delay: Duration,
    calls: Mutex<Vec<(&'static str, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a FakeTools);

impl<'a> InFlight<'a> {
    fn enter(tools: &'a FakeTools) -> Self {
        let now = tools.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        tools.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(tools)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speech(mut self, locator: &str, text: &str) -> Self {
        self.speech.insert(locator.to_string(), text.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|(o, _)| *o == op).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: &'static str, subject: impl Into<String>) {
        self.calls.lock().unwrap().push((op, subject.into()));
    }
}

#[async_trait]
impl Downloader for FakeTools {
    async fn fetch(&self, locator: &str, dest: &Path) -> Result<u64> {
        self.record("download", locator);
        let _guard = InFlight::enter(self);
        tokio::time::sleep(self.delay).await;

        if locator.starts_with("fail://") {
            return Err(PipelineError::Download(format!("404 for {}", locator)));
        }
        if locator.starts_with("hang://") {
            std::future::pending::<()>().await;
        }
        if locator.starts_with("panic://") {
            panic!("downloader blew up on {}", locator);
        }

        let text = self.speech.get(locator).cloned().unwrap_or_else(|| "stille".to_string());
        tokio::fs::write(dest, &text).await?;
        Ok(text.len() as u64)
    }
}

#[async_trait]
impl AudioConverter for FakeTools {
    async fn convert(&self, source: &Path, dest: &Path) -> Result<()> {
        self.record("convert", source.to_string_lossy());
        let _guard = InFlight::enter(self);
        tokio::fs::copy(source, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl Segmenter for FakeTools {
    async fn split(&self, source: &Path, dest_dir: &Path) -> Result<usize> {
        self.record("split", source.to_string_lossy());
        let _guard = InFlight::enter(self);
        tokio::fs::copy(source, dest_dir.join("chunk1.wav")).await?;
        Ok(1)
    }
}

#[async_trait]
impl Recognizer for FakeTools {
    async fn recognize(&self, segment: &Path) -> Result<String> {
        self.record("recognize", segment.to_string_lossy());
        let text = tokio::fs::read_to_string(segment).await?;
        if text == NOISE {
            return Err(PipelineError::Recognition("unintelligible".into()));
        }
        Ok(text)
    }
}

pub fn collaborators(tools: &Arc<FakeTools>) -> Collaborators {
    Collaborators {
        downloader: tools.clone(),
        converter: tools.clone(),
        segmenter: tools.clone(),
        recognizer: tools.clone(),
        extractor: CitationExtractor::new(PipelineConfig::default().citation_regex().unwrap()),
    }
}
