pub mod analyze;
pub mod convert;
pub mod download;
pub mod process;
pub mod segment;
pub mod task;
pub mod transcribe;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::PipelineConfig;
use crate::episode::{CatalogEntry, Episode, StageKind};
use crate::error::{ErrorKind, Result};
use crate::store::ArtifactStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use analyze::CitationExtractor;
use convert::{AudioConverter, FfmpegConverter};
use download::{Downloader, HttpDownloader};
use segment::{Segmenter, SoxSegmenter};
use task::{EpisodeOutcome, EpisodeTask, TaskContext, TaskState};
use transcribe::{Recognizer, WhisperCliRecognizer};

/// The external capabilities every stage is built from.
pub struct Collaborators {
    pub downloader: Arc<dyn Downloader>,
    pub converter: Arc<dyn AudioConverter>,
    pub segmenter: Arc<dyn Segmenter>,
    pub recognizer: Arc<dyn Recognizer>,
    pub extractor: CitationExtractor,
}

impl Collaborators {
    /// Production wiring: reqwest, ffmpeg, sox and whisper-cli.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let tools = &config.tools;
        Ok(Self {
            downloader: Arc::new(HttpDownloader::new(&config.download)?),
            converter: Arc::new(FfmpegConverter::new(&tools.ffmpeg)),
            segmenter: Arc::new(SoxSegmenter::new(&tools.sox, &config.segmentation)),
            recognizer: Arc::new(WhisperCliRecognizer::new(
                &tools.whisper_cli,
                &tools.whisper_model,
                tools.language.clone(),
            )?),
            extractor: CitationExtractor::new(config.citation_regex()?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub concurrency: usize,
    pub task_timeout: Duration,
    pub keep_audio: bool,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.worker_count(),
            task_timeout: config.task_timeout(),
            keep_audio: config.keep_audio,
        }
    }
}

/// Catalog entries after skipping `skip` and keeping at most `limit`.
pub fn select_range(catalog: Vec<CatalogEntry>, skip: usize, limit: Option<usize>) -> Vec<CatalogEntry> {
    catalog
        .into_iter()
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Bounded worker pool over episode tasks.
///
/// W workers pull from one job queue. Each task runs in its own spawned
/// future so a panic is contained to that episode, and each one gets its own
/// deadline when a worker picks it up.
pub struct PipelineOrchestrator {
    store: Arc<ArtifactStore>,
    collaborators: Arc<Collaborators>,
    options: RunOptions,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<ArtifactStore>, collaborators: Arc<Collaborators>, options: RunOptions) -> Self {
        Self {
            store,
            collaborators,
            options,
        }
    }

    /// Process every catalog entry exactly once and report what happened.
    ///
    /// Individual episode failures never fail the run. Cancelling `cancel`
    /// stops tasks at their next await point; queued tasks still report,
    /// as cancelled.
    pub async fn run(&self, catalog: Vec<CatalogEntry>, cancel: CancellationToken) -> Result<RunSummary> {
        self.store.ensure_root()?;
        let mut summary = RunSummary::start(catalog.len());
        if catalog.is_empty() {
            log::info!("Nothing to process");
            return Ok(summary.finish());
        }

        let workers = self.options.concurrency.clamp(1, catalog.len());
        log::info!(
            "Processing {} episodes with {} workers (timeout {:?} per episode)",
            catalog.len(),
            workers,
            self.options.task_timeout
        );

        let (job_tx, job_rx) = mpsc::channel::<EpisodeTask>(catalog.len());
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<EpisodeOutcome>(workers);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                job_rx.clone(),
                result_tx.clone(),
                self.options.task_timeout,
                cancel.clone(),
            )));
        }
        drop(result_tx);

        for entry in catalog {
            let task = EpisodeTask::new(
                Episode::from(entry),
                self.store.clone(),
                self.collaborators.clone(),
                self.options.keep_audio,
            );
            if job_tx.send(task).await.is_err() {
                log::error!("All workers stopped before the catalog was queued");
                break;
            }
        }
        drop(job_tx);

        while let Some(outcome) = result_rx.recv().await {
            summary.record(&outcome);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Worker terminated abnormally: {}", e);
            }
        }

        Ok(summary.finish())
    }
}

async fn worker_loop(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<EpisodeTask>>>,
    results: mpsc::Sender<EpisodeOutcome>,
    task_timeout: Duration,
    cancel: CancellationToken,
) {
    log::debug!("Worker {} started", worker_id);
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(task) = next else { break };

        let episode = task.episode().clone();
        let number = episode.number;
        let ctx = TaskContext::new(task_timeout, cancel.child_token());
        let span = tracing::info_span!("episode", number, worker = worker_id);

        let outcome = match tokio::spawn(task.run(ctx).instrument(span)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Episode {} aborted: {}", number, e);
                EpisodeOutcome::aborted(episode, e.to_string())
            }
        };

        if results.send(outcome).await.is_err() {
            break;
        }
    }
    log::debug!("Worker {} finished", worker_id);
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeFailure {
    pub episode: u32,
    pub kind: ErrorKind,
    pub stage: Option<StageKind>,
    pub message: String,
}

/// End-of-run report, also written as JSON next to the cache.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dispatched: usize,
    pub succeeded: usize,
    /// Episodes that were already fully processed before this run
    pub already_complete: usize,
    pub stages_executed: usize,
    pub failures: Vec<EpisodeFailure>,
}

impl RunSummary {
    pub fn start(dispatched: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dispatched,
            succeeded: 0,
            already_complete: 0,
            stages_executed: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &EpisodeOutcome) {
        self.stages_executed += outcome.executed.len();
        if outcome.state == TaskState::Done {
            self.succeeded += 1;
            if outcome.executed.is_empty() {
                self.already_complete += 1;
            }
            log::debug!("Episode {} done in {:?}", outcome.number(), outcome.elapsed);
            return;
        }

        let (kind, message) = match &outcome.error {
            Some(e) => (e.kind(), e.to_string()),
            None => (ErrorKind::Aborted, format!("ended in state {}", outcome.state)),
        };
        self.failures.push(EpisodeFailure {
            episode: outcome.number(),
            kind,
            stage: outcome.failed_stage,
            message,
        });
    }

    pub fn finish(mut self) -> Self {
        self.failures.sort_by_key(|f| f.episode);
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn log_report(&self) {
        log::info!(
            "Run finished: {} of {} episodes done ({} already complete), {} failed, {} stages executed",
            self.succeeded,
            self.dispatched,
            self.already_complete,
            self.failures.len(),
            self.stages_executed
        );
        for failure in &self.failures {
            match failure.stage {
                Some(stage) => log::warn!(
                    "Episode {} failed at {} ({}): {}",
                    failure.episode,
                    stage,
                    failure.kind,
                    failure.message
                ),
                None => log::warn!(
                    "Episode {} failed ({}): {}",
                    failure.episode,
                    failure.kind,
                    failure.message
                ),
            }
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::debug!("Run summary written to {:?}", path);
        Ok(())
    }
}
