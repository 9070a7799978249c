use super::transcribe::transcribe_segments;
use super::Collaborators;
use crate::episode::{Episode, StageKind};
use crate::error::{PipelineError, Result};
use crate::links::render_links;
use crate::resolver::StageResolver;
use crate::store::{list_segments, ArtifactStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one episode's pipeline. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Downloading,
    Converting,
    Segmenting,
    Transcribing,
    Analyzing,
    Done,
    Failed,
}

impl TaskState {
    /// The state an episode is in while `stage` is being produced.
    pub fn running(stage: StageKind) -> Self {
        match stage {
            StageKind::Raw => Self::Downloading,
            StageKind::Converted => Self::Converting,
            StageKind::Segmented => Self::Segmenting,
            StageKind::Transcribed => Self::Transcribing,
            StageKind::CrossReferenced => Self::Analyzing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Converting => write!(f, "converting"),
            Self::Segmenting => write!(f, "segmenting"),
            Self::Transcribing => write!(f, "transcribing"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Deadline and cancellation handed to a task when a worker picks it up.
#[derive(Clone)]
pub struct TaskContext {
    pub deadline: Instant,
    pub budget: Duration,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(budget: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + budget,
            budget,
            cancel,
        }
    }
}

/// What happened to one episode.
#[derive(Debug)]
pub struct EpisodeOutcome {
    pub episode: Episode,
    pub state: TaskState,
    pub resumed_from: Option<StageKind>,
    pub executed: Vec<StageKind>,
    pub failed_stage: Option<StageKind>,
    pub error: Option<PipelineError>,
    pub transitions: Vec<TaskState>,
    pub elapsed: Duration,
}

impl EpisodeOutcome {
    pub fn number(&self) -> u32 {
        self.episode.number
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Done
    }

    /// Outcome for a task that never returned (it panicked).
    pub fn aborted(episode: Episode, reason: String) -> Self {
        Self {
            episode,
            state: TaskState::Failed,
            resumed_from: None,
            executed: Vec::new(),
            failed_stage: None,
            error: Some(PipelineError::Aborted(reason)),
            transitions: vec![TaskState::Failed],
            elapsed: Duration::ZERO,
        }
    }
}

/// Resumable per-episode state machine.
///
/// Runs the stages the resolver reports as missing, in order, each one
/// staged and then atomically published to the store. The first failing
/// stage ends the task in `Failed`.
pub struct EpisodeTask {
    episode: Episode,
    state: TaskState,
    transitions: Vec<TaskState>,
    store: Arc<ArtifactStore>,
    collaborators: Arc<Collaborators>,
    keep_audio: bool,
}

impl EpisodeTask {
    pub fn new(
        episode: Episode,
        store: Arc<ArtifactStore>,
        collaborators: Arc<Collaborators>,
        keep_audio: bool,
    ) -> Self {
        Self {
            episode,
            state: TaskState::Pending,
            transitions: vec![TaskState::Pending],
            store,
            collaborators,
            keep_audio,
        }
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub async fn run(mut self, ctx: TaskContext) -> EpisodeOutcome {
        let started = std::time::Instant::now();
        let number = self.episode.number;
        log::debug!("Starting to handle Episode {}", number);

        let resolution = StageResolver::new(&self.store).resolve(number);
        match resolution.already_at {
            Some(stage) => {
                log::debug!("Found cached {} artifact for Episode {}", stage, number);
                let path = self.store.path_for(number, stage);
                self.episode = self.episode.clone().with_artifact(stage, path);
            }
            None => log::debug!("No cached information found for Episode {}", number),
        }

        let mut executed = Vec::new();
        for stage in resolution.remaining {
            self.transition(TaskState::running(stage));
            match self.execute(stage, &ctx).await {
                Ok(path) => {
                    self.episode = self.episode.clone().with_artifact(stage, path);
                    executed.push(stage);
                    self.reclaim_superseded(stage);
                }
                Err(e) => {
                    log::error!("Episode {} failed while {}: {}", number, self.state, e);
                    self.transition(TaskState::Failed);
                    return self.into_outcome(resolution.already_at, executed, Some((stage, e)), started);
                }
            }
        }

        self.reclaim_segments();
        self.transition(TaskState::Done);
        log::info!("Handled Episode {}", number);
        self.into_outcome(resolution.already_at, executed, None, started)
    }

    fn transition(&mut self, next: TaskState) {
        log::debug!("Episode {}: {} -> {}", self.episode.number, self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    /// Produce one stage into a staging path under the task's deadline, then
    /// publish it. Nothing partial is ever visible at the final path.
    async fn execute(&self, stage: StageKind, ctx: &TaskContext) -> Result<PathBuf> {
        let number = self.episode.number;
        let staged = self.store.staging_path(number, stage);

        let produced = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(PipelineError::Cancelled),
            _ = tokio::time::sleep_until(ctx.deadline) => Err(PipelineError::Timeout(ctx.budget)),
            result = self.produce(stage, &staged) => result,
        };

        match produced.and_then(|_| self.store.publish(&staged, number, stage)) {
            Ok(path) => Ok(path),
            Err(e) => {
                self.store.discard(&staged);
                Err(e)
            }
        }
    }

    async fn produce(&self, stage: StageKind, staged: &Path) -> Result<()> {
        let number = self.episode.number;
        match stage {
            StageKind::Raw => {
                log::debug!("Downloading Episode {} from {}...", number, self.episode.locator);
                self.collaborators
                    .downloader
                    .fetch(&self.episode.locator, staged)
                    .await?;
            }
            StageKind::Converted => {
                let source = self.input_for(stage)?;
                self.collaborators.converter.convert(&source, staged).await?;
            }
            StageKind::Segmented => {
                let source = self.input_for(stage)?;
                tokio::fs::create_dir_all(staged).await?;
                let count = self.collaborators.segmenter.split(&source, staged).await?;
                log::debug!("Episode {} split into {} segments", number, count);
            }
            StageKind::Transcribed => {
                let segment_dir = self.input_for(stage)?;
                let segments = list_segments(&segment_dir)?;
                log::info!(
                    "Transcribing Episode {} with {} segments from {:?}",
                    number,
                    segments.len(),
                    segment_dir
                );
                let text =
                    transcribe_segments(self.collaborators.recognizer.as_ref(), &segments).await;
                tokio::fs::write(staged, text).await?;
            }
            StageKind::CrossReferenced => {
                let transcript_path = self.input_for(stage)?;
                log::debug!("Analysing the transcript of Episode {}", number);
                let transcript = tokio::fs::read_to_string(&transcript_path)
                    .await
                    .map_err(|e| {
                        PipelineError::invalid_artifact(&transcript_path, format!("unreadable transcript: {}", e))
                    })?;
                let cited = self.collaborators.extractor.extract(&transcript, number);
                log::debug!("Episode {} cites {} other episodes", number, cited.len());
                tokio::fs::write(staged, render_links(&cited)).await?;
            }
        }
        Ok(())
    }

    /// The artifact of the stage before `stage`, produced or found cached.
    fn input_for(&self, stage: StageKind) -> Result<PathBuf> {
        let previous = stage.previous().ok_or_else(|| {
            PipelineError::Io(format!("{} stage has no input artifact", stage))
        })?;
        self.episode
            .artifact(previous)
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                PipelineError::invalid_artifact(
                    self.store.path_for(self.episode.number, previous),
                    format!("{} input missing for {} stage", previous, stage),
                )
            })
    }

    /// Drop audio that a freshly published stage has made redundant.
    fn reclaim_superseded(&mut self, published: StageKind) {
        if self.keep_audio {
            return;
        }
        let superseded = match published {
            StageKind::Converted => StageKind::Raw,
            StageKind::Segmented => StageKind::Converted,
            _ => return,
        };
        self.reclaim(superseded);
    }

    /// The segment directory is never kept once an episode is done.
    fn reclaim_segments(&mut self) {
        self.reclaim(StageKind::Segmented);
    }

    fn reclaim(&mut self, stage: StageKind) {
        let number = self.episode.number;
        match self.store.remove(number, stage) {
            Ok(true) => {
                log::debug!("Removed {} cache of Episode {}", stage, number);
                self.episode = self.episode.clone().without_artifact(stage);
            }
            Ok(false) => {}
            Err(e) => log::warn!("Failed to remove {} cache of Episode {}: {}", stage, number, e),
        }
    }

    fn into_outcome(
        self,
        resumed_from: Option<StageKind>,
        executed: Vec<StageKind>,
        failure: Option<(StageKind, PipelineError)>,
        started: std::time::Instant,
    ) -> EpisodeOutcome {
        let (failed_stage, error) = match failure {
            Some((stage, e)) => (Some(stage), Some(e)),
            None => (None, None),
        };
        EpisodeOutcome {
            episode: self.episode,
            state: self.state,
            resumed_from,
            executed,
            failed_stage,
            error,
            transitions: self.transitions,
            elapsed: started.elapsed(),
        }
    }
}
