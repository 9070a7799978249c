use crate::error::{PipelineError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DIRECTORY_URL: &str =
    "https://scienceblogs.de/astrodicticum-simplex/sternengeschichten/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// HTML page listing one download link per episode
    Page,
    /// Podcast RSS/Atom feed
    Feed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub kind: CatalogKind,
    pub url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            kind: CatalogKind::Page,
            url: DEFAULT_DIRECTORY_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub attempts: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            connect_timeout_secs: 30,
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub sox: PathBuf,
    pub whisper_cli: PathBuf,
    pub whisper_model: PathBuf,
    pub language: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            sox: PathBuf::from("sox"),
            whisper_cli: PathBuf::from("whisper-cli"),
            whisper_model: PathBuf::from("models").join("ggml-base.bin"),
            language: "de".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Silence at least this long splits two segments
    pub min_silence_secs: f64,
    /// Level below which audio counts as silence, in sox notation (`1%`, `-40d`)
    pub threshold: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_silence_secs: 0.5,
            threshold: "1%".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub name: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "sternengeschichten".to_string(),
        }
    }
}

/// Everything a pipeline run needs, loaded from YAML with per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    /// Worker pool size; `None` means one worker per logical CPU
    pub concurrency: Option<usize>,
    pub task_timeout_secs: u64,
    /// Catalog entries to skip before processing starts
    pub skip: usize,
    /// Upper bound on the number of episodes processed after `skip`
    pub limit: Option<usize>,
    pub keep_audio: bool,
    pub citation_pattern: String,
    pub catalog: CatalogConfig,
    pub download: DownloadConfig,
    pub tools: ToolsConfig,
    pub segmentation: SegmentationConfig,
    pub graph: GraphConfig,
    pub log_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            concurrency: None,
            task_timeout_secs: 300,
            skip: 0,
            limit: None,
            keep_audio: false,
            citation_pattern: r"folge\s+(\d+)".to_string(),
            catalog: CatalogConfig::default(),
            download: DownloadConfig::default(),
            tools: ToolsConfig::default(),
            segmentation: SegmentationConfig::default(),
            graph: GraphConfig::default(),
            log_file: Some(PathBuf::from("applicationLog.log")),
        }
    }
}

impl PipelineConfig {
    /// Load from an explicit file, else from the user config directory if a
    /// file exists there, else fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(p) => p,
                None => {
                    log::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config {:?}: {}", path, e)))?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            return Err(PipelineError::Config("concurrency must be positive".into()));
        }
        if self.task_timeout_secs == 0 {
            return Err(PipelineError::Config("task_timeout_secs must be positive".into()));
        }
        if self.download.attempts == 0 {
            return Err(PipelineError::Config("download.attempts must be positive".into()));
        }
        self.citation_regex()?;
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.concurrency.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// The citation pattern, compiled case-insensitively. Group 1 must
    /// capture the cited episode number.
    pub fn citation_regex(&self) -> Result<Regex> {
        let re = RegexBuilder::new(&self.citation_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| PipelineError::Config(format!("invalid citation_pattern: {}", e)))?;
        if re.captures_len() < 2 {
            return Err(PipelineError::Config(
                "citation_pattern needs a capture group for the episode number".into(),
            ));
        }
        Ok(re)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sternengeschichten-graph").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.task_timeout(), Duration::from_secs(300));
        assert!(config.worker_count() >= 1);
        assert_eq!(config.catalog.kind, CatalogKind::Page);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = PipelineConfig::from_yaml(
            "cache_dir: /tmp/episodes\nconcurrency: 4\nskip: 25\nlimit: 12\ntools:\n  language: en\n",
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/episodes"));
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.skip, 25);
        assert_eq!(config.limit, Some(12));
        assert_eq!(config.tools.language, "en");
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.task_timeout_secs, 300);
    }

    #[test]
    fn test_feed_catalog_yaml() {
        let config = PipelineConfig::from_yaml(
            "catalog:\n  kind: feed\n  url: https://example.org/feed.xml\n",
        )
        .unwrap();
        assert_eq!(config.catalog.kind, CatalogKind::Feed);
        assert_eq!(config.catalog.url, "https://example.org/feed.xml");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = PipelineConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = PipelineConfig::from_yaml("concurrency: [1, 2").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = PipelineConfig::default();
        config.concurrency = Some(0);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.task_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_citation_pattern_needs_group() {
        let mut config = PipelineConfig::default();
        config.citation_pattern = r"folge \d+".to_string();
        assert!(config.validate().is_err());

        config.citation_pattern = r"folge (\d+".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_citation_regex_ignores_case() {
        let re = PipelineConfig::default().citation_regex().unwrap();
        assert!(re.is_match("In FOLGE 12 ging es um"));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "keep_audio: true\n").unwrap();
        assert!(PipelineConfig::load(Some(&path)).unwrap().keep_audio);
        assert!(PipelineConfig::load(Some(&temp.path().join("nope.yaml"))).is_err());
    }
}
