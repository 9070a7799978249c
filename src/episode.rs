use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One step of the derivation chain. Declaration order is the stage order,
/// so `Ord` compares how far along an episode is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Raw,
    Converted,
    Segmented,
    Transcribed,
    CrossReferenced,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Raw,
        StageKind::Converted,
        StageKind::Segmented,
        StageKind::Transcribed,
        StageKind::CrossReferenced,
    ];

    /// Stages strictly after `completed`, ascending. `None` yields the full chain.
    pub fn after(completed: Option<StageKind>) -> Vec<StageKind> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| completed.map_or(true, |c| *s > c))
            .collect()
    }

    pub fn previous(self) -> Option<StageKind> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        idx.checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Segment output is a directory; every other stage produces one file.
    pub fn is_directory(self) -> bool {
        matches!(self, StageKind::Segmented)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Converted => write!(f, "converted"),
            Self::Segmented => write!(f, "segmented"),
            Self::Transcribed => write!(f, "transcribed"),
            Self::CrossReferenced => write!(f, "cross_referenced"),
        }
    }
}

/// An entry of the remote episode catalog, numbered in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub number: u32,
    pub locator: String,
}

/// One episode and the artifacts derived for it so far.
///
/// Updated only by value through [`Episode::with_artifact`]; the owning
/// episode task is the single writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub number: u32,
    pub locator: String,
    artifacts: BTreeMap<StageKind, PathBuf>,
}

impl Episode {
    pub fn new(number: u32, locator: impl Into<String>) -> Self {
        Self {
            number,
            locator: locator.into(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Record the artifact for `stage`, replacing any earlier location.
    pub fn with_artifact(mut self, stage: StageKind, path: PathBuf) -> Self {
        self.artifacts.insert(stage, path);
        self
    }

    /// Forget a stage whose artifact was reclaimed from disk.
    pub fn without_artifact(mut self, stage: StageKind) -> Self {
        self.artifacts.remove(&stage);
        self
    }

    pub fn artifact(&self, stage: StageKind) -> Option<&Path> {
        self.artifacts.get(&stage).map(PathBuf::as_path)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = (StageKind, &Path)> {
        self.artifacts.iter().map(|(k, p)| (*k, p.as_path()))
    }
}

impl From<CatalogEntry> for Episode {
    fn from(entry: CatalogEntry) -> Self {
        Episode::new(entry.number, entry.locator)
    }
}
