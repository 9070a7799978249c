use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Typed error hierarchy for the episode pipeline.
///
/// Catalog and configuration errors are fatal for a run. Everything else is
/// caught at the episode task boundary and recorded against that episode.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("episode catalog could not be retrieved: {0}")]
    CatalogRetrieval(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("audio conversion failed: {0}")]
    Conversion(String),

    #[error("silence segmentation failed: {0}")]
    Segmentation(String),

    #[error("speech recognition failed: {0}")]
    Recognition(String),

    #[error("invalid artifact at {path:?}: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("episode task exceeded its time budget of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("run cancelled")]
    Cancelled,

    #[error("episode task aborted: {0}")]
    Aborted(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Io(String),
}

/// Coarse classification reported in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CatalogRetrieval,
    Download,
    Conversion,
    Segmentation,
    Recognition,
    InvalidArtifact,
    Timeout,
    Cancelled,
    Aborted,
    Config,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CatalogRetrieval => "catalog_retrieval",
            Self::Download => "download",
            Self::Conversion => "conversion",
            Self::Segmentation => "segmentation",
            Self::Recognition => "recognition",
            Self::InvalidArtifact => "invalid_artifact",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
            Self::Config => "config",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CatalogRetrieval(_) => ErrorKind::CatalogRetrieval,
            Self::Download(_) => ErrorKind::Download,
            Self::Conversion(_) => ErrorKind::Conversion,
            Self::Segmentation(_) => ErrorKind::Segmentation,
            Self::Recognition(_) => ErrorKind::Recognition,
            Self::InvalidArtifact { .. } => ErrorKind::InvalidArtifact,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error must end the whole run rather than one episode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CatalogRetrieval(_) | Self::Config(_))
    }

    pub fn invalid_artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Io(format!("json: {}", e))
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::Config(e.to_string())
    }
}

impl From<walkdir::Error> for PipelineError {
    fn from(e: walkdir::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}
