//! Directed cross-reference graph built from the links files.

pub mod dot;

use crate::episode::StageKind;
use crate::error::{PipelineError, Result};
use crate::links::read_links_file;
use crate::store::{artifact_pattern, episode_number_from_name, scan_artifacts};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Edges `(from, to)` where `from`'s transcript cites `to`, plus the
/// episodes that neither cite nor are cited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EpisodeGraph {
    pub edges: BTreeSet<(u32, u32)>,
    pub standalone: BTreeSet<u32>,
}

impl EpisodeGraph {
    /// Episodes with at least one incident edge.
    pub fn connected(&self) -> BTreeSet<u32> {
        self.edges.iter().flat_map(|(from, to)| [*from, *to]).collect()
    }

    pub fn nodes(&self) -> BTreeSet<u32> {
        let mut nodes = self.connected();
        nodes.extend(self.standalone.iter().copied());
        nodes
    }
}

pub struct LinkGraphBuilder {
    edges: BTreeSet<(u32, u32)>,
    mentioned: BTreeSet<u32>,
    standalone: BTreeSet<u32>,
    pattern: Regex,
}

impl LinkGraphBuilder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            edges: BTreeSet::new(),
            mentioned: BTreeSet::new(),
            standalone: BTreeSet::new(),
            pattern: artifact_pattern(StageKind::CrossReferenced)?,
        })
    }

    /// Fold one episode's cited set into the graph.
    pub fn add(&mut self, owner: u32, cited: &BTreeSet<u32>) {
        if cited.is_empty() {
            self.standalone.insert(owner);
        }
        for to in cited {
            self.edges.insert((owner, *to));
            self.mentioned.insert(owner);
            self.mentioned.insert(*to);
        }
    }

    /// Parse a links file and fold it in. The owner comes from the file name.
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let owner = episode_number_from_name(&name, &self.pattern).ok_or_else(|| {
            PipelineError::invalid_artifact(path, "file name carries no episode number")
        })?;
        let cited = read_links_file(path)?;
        log::debug!("Found {} linked episodes in links file {:?}", cited.len(), path);
        self.add(owner, &cited);
        Ok(())
    }

    pub fn finish(self) -> EpisodeGraph {
        let standalone = self
            .standalone
            .difference(&self.mentioned)
            .copied()
            .collect();
        EpisodeGraph {
            edges: self.edges,
            standalone,
        }
    }

    /// Build the graph from every given links file. Unreadable files are
    /// logged and left out rather than failing the whole graph.
    pub fn build<I, P>(paths: I) -> Result<EpisodeGraph>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut builder = Self::new()?;
        for path in paths {
            if let Err(e) = builder.add_file(path.as_ref()) {
                log::warn!("Skipping links file {:?}: {}", path.as_ref(), e);
            }
        }
        Ok(builder.finish())
    }
}

/// All links files below `dir`, searched recursively.
pub fn find_links_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "links directory {:?} was not found",
            dir
        )));
    }
    let mut files: Vec<PathBuf> = scan_artifacts(dir, StageKind::CrossReferenced, true)?
        .into_iter()
        .map(|(_, path)| path)
        .collect();
    files.sort();
    log::info!("Found {} *.links files", files.len());
    Ok(files)
}

/// Scan `dir` for links files and build the episode graph from them.
pub fn build_from_dir(dir: &Path) -> Result<EpisodeGraph> {
    let files = find_links_files(dir)?;
    let graph = LinkGraphBuilder::build(&files)?;
    log::info!(
        "Episode graph: {} edges, {} connected, {} standalone",
        graph.edges.len(),
        graph.connected().len(),
        graph.standalone.len()
    );
    Ok(graph)
}
