use crate::config::DownloadConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Fetches an episode's source audio to a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the resource at `locator` to `dest`. Returns the byte count.
    async fn fetch(&self, locator: &str, dest: &Path) -> Result<u64>;
}

/// Streaming HTTP downloader with retry and length validation.
pub struct HttpDownloader {
    client: reqwest::Client,
    attempts: usize,
    backoff: Vec<Duration>,
}

impl HttpDownloader {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            attempts: config.attempts.max(1),
            backoff: vec![
                Duration::from_secs(2),
                Duration::from_secs(8),
                Duration::from_secs(30),
            ],
        })
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay_after(&self, attempt: usize) -> Duration {
        self.backoff
            .get(attempt)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }

    /// Single download attempt with streaming and validation
    async fn try_download(&self, locator: &str, dest: &Path) -> std::result::Result<u64, String> {
        log::info!("Downloading {} to: {:?}", locator, dest);

        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| format!("Failed to start download: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Download failed with status: {}", response.status()));
        }

        let content_length = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| format!("Failed to create file: {}", e))?;
        let mut downloaded: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| format!("Error reading download stream: {}", e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("Failed to write chunk: {}", e))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| format!("Failed to flush file: {}", e))?;

        if let Some(expected) = content_length {
            if downloaded != expected {
                return Err(format!(
                    "Download incomplete: got {} bytes, expected {}",
                    downloaded, expected
                ));
            }
        }
        if downloaded == 0 {
            return Err("Download returned an empty body".to_string());
        }

        log::info!("Download complete: {} bytes", downloaded);
        Ok(downloaded)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, locator: &str, dest: &Path) -> Result<u64> {
        let mut last_error = String::new();
        for attempt in 0..self.attempts {
            match self.try_download(locator, dest).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    // Clean up partial file
                    let _ = tokio::fs::remove_file(dest).await;
                    if attempt + 1 < self.attempts {
                        let delay = self.delay_after(attempt);
                        log::warn!(
                            "Download attempt {} failed, retrying in {}s: {}",
                            attempt + 1,
                            delay.as_secs(),
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = e;
                }
            }
        }
        Err(PipelineError::Download(format!(
            "{} failed after {} attempts: {}",
            locator, self.attempts, last_error
        )))
    }
}
