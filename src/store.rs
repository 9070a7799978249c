//! Durable artifact cache. Every stage output lives at a path derived from the
//! episode number alone, so the filesystem is the only resumption record.

use crate::episode::StageKind;
use crate::error::{PipelineError, Result};
use crate::links;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn path_for(&self, number: u32, stage: StageKind) -> PathBuf {
        self.root.join(artifact_name(number, stage))
    }

    /// Plain existence check, without looking at the content.
    pub fn exists(&self, number: u32, stage: StageKind) -> bool {
        let path = self.path_for(number, stage);
        if stage.is_directory() {
            path.is_dir()
        } else {
            path.is_file()
        }
    }

    /// Existence plus a cheap integrity check.
    ///
    /// `Ok(None)` when nothing is there, `Err(InvalidArtifact)` when something
    /// is there but cannot serve as the stage's output.
    pub fn probe(&self, number: u32, stage: StageKind) -> Result<Option<PathBuf>> {
        let path = self.path_for(number, stage);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PipelineError::invalid_artifact(&path, e.to_string())),
        };

        if stage.is_directory() != meta.is_dir() {
            return Err(PipelineError::invalid_artifact(
                &path,
                if meta.is_dir() { "expected a file, found a directory" } else { "expected a directory" },
            ));
        }

        match stage {
            StageKind::Raw | StageKind::Converted => {
                if meta.len() == 0 {
                    return Err(PipelineError::invalid_artifact(&path, "empty audio file"));
                }
            }
            StageKind::Segmented => {
                if list_segments(&path)?.is_empty() {
                    return Err(PipelineError::invalid_artifact(&path, "segment directory holds no audio"));
                }
            }
            StageKind::Transcribed => {
                std::fs::read_to_string(&path).map_err(|e| {
                    PipelineError::invalid_artifact(&path, format!("unreadable transcript: {}", e))
                })?;
            }
            StageKind::CrossReferenced => {
                links::read_links_file(&path)?;
            }
        }
        Ok(Some(path))
    }

    /// A unique scratch location next to the final artifact. Stage writers
    /// fill it and hand it to [`ArtifactStore::publish`].
    pub fn staging_path(&self, number: u32, stage: StageKind) -> PathBuf {
        self.root.join(format!(
            ".{}.{}.partial",
            artifact_name(number, stage),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Atomically move a fully written staging file or directory into place.
    pub fn publish(&self, staged: &Path, number: u32, stage: StageKind) -> Result<PathBuf> {
        let target = self.path_for(number, stage);
        if stage.is_directory() && target.exists() {
            // rename() refuses to replace a non-empty directory
            remove_path(&target)?;
        }
        std::fs::rename(staged, &target).map_err(|e| {
            PipelineError::Io(format!("failed to publish {:?} as {:?}: {}", staged, target, e))
        })?;
        log::debug!("Published {} artifact for episode {} at {:?}", stage, number, target);
        Ok(target)
    }

    /// Best-effort cleanup of an abandoned staging path.
    pub fn discard(&self, staged: &Path) {
        if let Err(e) = remove_path(staged) {
            log::warn!("Failed to discard staging path {:?}: {}", staged, e);
        }
    }

    /// Delete a stage artifact. Returns whether anything was removed.
    pub fn remove(&self, number: u32, stage: StageKind) -> Result<bool> {
        let path = self.path_for(number, stage);
        if !path.exists() {
            return Ok(false);
        }
        remove_path(&path)?;
        Ok(true)
    }

    /// Episode numbers with an artifact for `stage` directly under the root.
    pub fn scan(&self, stage: StageKind) -> Result<Vec<(u32, PathBuf)>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        scan_artifacts(&self.root, stage, false)
    }
}

/// Canonical file or directory name of a stage artifact.
pub fn artifact_name(number: u32, stage: StageKind) -> String {
    match stage {
        StageKind::Raw => format!("Episode{}.mp3", number),
        StageKind::Converted => format!("Episode{}.wav", number),
        StageKind::Segmented => format!("chunks{}", number),
        StageKind::Transcribed => format!("Episode{}_transcript.txt", number),
        StageKind::CrossReferenced => format!("Episode{}.links", number),
    }
}

/// Case-insensitive, end-anchored pattern capturing the episode number from
/// any name that ends in the stage's suffix.
pub fn artifact_pattern(stage: StageKind) -> Result<Regex> {
    let pattern = match stage {
        StageKind::Raw => r"^.*?(\d+)\.mp3$",
        StageKind::Converted => r"^.*?(\d+)\.wav$",
        StageKind::Segmented => r"^chunks(\d+)$",
        StageKind::Transcribed => r"^.*?(\d+)_transcript\.txt$",
        StageKind::CrossReferenced => r"^.*?(\d+)\.links$",
    };
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| PipelineError::Config(format!("artifact pattern for {}: {}", stage, e)))
}

/// Extract the episode number from an artifact file name.
pub fn episode_number_from_name(name: &str, pattern: &Regex) -> Option<u32> {
    pattern
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Find every artifact of `stage` in `dir`, optionally descending into subdirectories.
pub fn scan_artifacts(dir: &Path, stage: StageKind, recursive: bool) -> Result<Vec<(u32, PathBuf)>> {
    let pattern = artifact_pattern(stage)?;
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = entry?;
        let kind_matches = if stage.is_directory() {
            entry.file_type().is_dir()
        } else {
            entry.file_type().is_file()
        };
        if !kind_matches {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some(number) = episode_number_from_name(&name, &pattern) {
            found.push((number, entry.into_path()));
        }
    }

    log::debug!("Found {} {} artifacts under {:?}", found.len(), stage, dir);
    Ok(found)
}

/// Segment audio files of a segment directory in natural order
/// (`chunk2.wav` before `chunk10.wav`).
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut segments: Vec<(Option<u64>, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
        })
        .map(|path| (trailing_number(&path), path))
        .collect();

    segments.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(segments.into_iter().map(|(_, p)| p).collect())
}

fn trailing_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_string_lossy();
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (ArtifactStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("cache"));
        store.ensure_root().unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_paths_are_deterministic() {
        let store = ArtifactStore::new("cache");
        assert_eq!(store.path_for(7, StageKind::Raw), Path::new("cache/Episode7.mp3"));
        assert_eq!(store.path_for(7, StageKind::Segmented), Path::new("cache/chunks7"));
        assert_eq!(
            store.path_for(7, StageKind::Transcribed),
            Path::new("cache/Episode7_transcript.txt")
        );
        assert_eq!(store.path_for(7, StageKind::CrossReferenced), Path::new("cache/Episode7.links"));
    }

    #[test]
    fn test_probe_absent() {
        let (store, _temp) = setup_store();
        assert!(store.probe(1, StageKind::Raw).unwrap().is_none());
        assert!(!store.exists(1, StageKind::Raw));
    }

    #[test]
    fn test_probe_rejects_empty_audio() {
        let (store, _temp) = setup_store();
        std::fs::write(store.path_for(3, StageKind::Converted), b"").unwrap();
        assert!(store.exists(3, StageKind::Converted));
        let err = store.probe(3, StageKind::Converted).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArtifact);
    }

    #[test]
    fn test_probe_segment_dir_needs_audio() {
        let (store, _temp) = setup_store();
        let dir = store.path_for(4, StageKind::Segmented);
        std::fs::create_dir_all(&dir).unwrap();
        assert!(store.probe(4, StageKind::Segmented).is_err());

        std::fs::write(dir.join("chunk1.wav"), b"RIFF").unwrap();
        assert_eq!(store.probe(4, StageKind::Segmented).unwrap(), Some(dir));
    }

    #[test]
    fn test_probe_rejects_malformed_links() {
        let (store, _temp) = setup_store();
        std::fs::write(store.path_for(5, StageKind::CrossReferenced), "12\nnope\n").unwrap();
        assert!(store.probe(5, StageKind::CrossReferenced).is_err());

        // An empty links file is a valid "cites nothing" result
        std::fs::write(store.path_for(6, StageKind::CrossReferenced), "").unwrap();
        assert!(store.probe(6, StageKind::CrossReferenced).unwrap().is_some());
    }

    #[test]
    fn test_probe_rejects_non_utf8_transcript() {
        let (store, _temp) = setup_store();
        std::fs::write(store.path_for(8, StageKind::Transcribed), [0xff, 0xfe, 0x00]).unwrap();
        assert!(store.probe(8, StageKind::Transcribed).is_err());
    }

    #[test]
    fn test_publish_file_and_directory() {
        let (store, _temp) = setup_store();

        let staged = store.staging_path(9, StageKind::Transcribed);
        std::fs::write(&staged, "Hallo. ").unwrap();
        let published = store.publish(&staged, 9, StageKind::Transcribed).unwrap();
        assert!(!staged.exists());
        assert_eq!(std::fs::read_to_string(published).unwrap(), "Hallo. ");

        // Replace a stale segment directory
        let stale = store.path_for(9, StageKind::Segmented);
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("chunk1.wav"), b"old").unwrap();

        let staged_dir = store.staging_path(9, StageKind::Segmented);
        std::fs::create_dir_all(&staged_dir).unwrap();
        std::fs::write(staged_dir.join("chunk001.wav"), b"new").unwrap();
        store.publish(&staged_dir, 9, StageKind::Segmented).unwrap();

        let segments = list_segments(&stale).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].ends_with("chunk001.wav"));
    }

    #[test]
    fn test_staging_paths_are_invisible_to_scans() {
        let (store, _temp) = setup_store();
        let staged = store.staging_path(2, StageKind::CrossReferenced);
        std::fs::write(&staged, "1\n").unwrap();
        assert!(store.scan(StageKind::CrossReferenced).unwrap().is_empty());
        store.discard(&staged);
        assert!(!staged.exists());
    }

    #[test]
    fn test_remove_reports_whether_anything_went() {
        let (store, _temp) = setup_store();
        assert!(!store.remove(1, StageKind::Segmented).unwrap());
        std::fs::create_dir_all(store.path_for(1, StageKind::Segmented).join("nested")).unwrap();
        assert!(store.remove(1, StageKind::Segmented).unwrap());
        assert!(!store.exists(1, StageKind::Segmented));
    }

    #[test]
    fn test_pattern_is_case_insensitive_and_anchored() {
        let pattern = artifact_pattern(StageKind::CrossReferenced).unwrap();
        assert_eq!(episode_number_from_name("Episode12.links", &pattern), Some(12));
        assert_eq!(episode_number_from_name("backup of EPISODE 40.LINKS", &pattern), Some(40));
        assert_eq!(episode_number_from_name("Episode12.links.bak", &pattern), None);
        assert_eq!(episode_number_from_name("notes.links", &pattern), None);
    }

    #[test]
    fn test_scan_recursive_vs_flat() {
        let (store, _temp) = setup_store();
        std::fs::write(store.path_for(1, StageKind::CrossReferenced), "").unwrap();
        let nested = store.root().join("older");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Episode2.links"), "").unwrap();

        assert_eq!(store.scan(StageKind::CrossReferenced).unwrap().len(), 1);
        let mut all: Vec<u32> = scan_artifacts(store.root(), StageKind::CrossReferenced, true)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        all.sort();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn test_list_segments_natural_order() {
        let temp = TempDir::new().unwrap();
        for name in ["chunk10.wav", "chunk2.wav", "chunk1.wav", "notes.txt"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = list_segments(temp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["chunk1.wav", "chunk2.wav", "chunk10.wav"]);
    }
}
