//! Resumable transcription pipeline for the Sternengeschichten podcast and
//! the episode cross-reference graph built from its transcripts.

pub mod catalog;
pub mod config;
pub mod episode;
pub mod error;
pub mod gaps;
pub mod graph;
pub mod links;
pub mod logging;
pub mod resolver;
pub mod store;
pub mod worker;

use config::PipelineConfig;
use error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::ArtifactStore;
use tokio_util::sync::CancellationToken;
use worker::{select_range, Collaborators, PipelineOrchestrator, RunOptions, RunSummary};

/// File name of the JSON run report inside the cache directory.
pub const RUN_SUMMARY_FILE: &str = "last_run.json";

/// One full pipeline run: fetch the catalog, process the configured range
/// and write the run summary.
///
/// Only configuration and catalog problems are returned as errors. Episode
/// failures are part of the summary.
pub async fn run_pipeline(config: &PipelineConfig, cancel: CancellationToken) -> Result<RunSummary> {
    config.validate()?;
    let store = Arc::new(ArtifactStore::new(&config.cache_dir));
    store.ensure_root()?;

    let collaborators = Arc::new(Collaborators::from_config(config)?);
    let source = catalog::from_config(&config.catalog)?;
    let catalog = source.fetch().await?;
    log::info!("Retrieved {} Podcast Episodes", catalog.len());

    let selected = select_range(catalog, config.skip, config.limit);
    let orchestrator = PipelineOrchestrator::new(store.clone(), collaborators, RunOptions::from_config(config));
    let summary = orchestrator.run(selected, cancel).await?;

    summary.log_report();
    let summary_path = store.root().join(RUN_SUMMARY_FILE);
    if let Err(e) = summary.write_json(&summary_path) {
        log::warn!("Failed to write run summary to {:?}: {}", summary_path, e);
    }
    Ok(summary)
}

/// Build the cross-reference graph from every links file under `links_dir`
/// and write `<name>.gv` into `out_dir`.
pub fn export_graph(links_dir: &Path, name: &str, out_dir: &Path) -> Result<PathBuf> {
    let graph = graph::build_from_dir(links_dir)?;
    log::info!(
        "Graph has {} edges and {} standalone episodes",
        graph.edges.len(),
        graph.standalone.len()
    );
    graph::dot::write_dot(&graph, name, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use episode::StageKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_config_stops_before_any_work() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            cache_dir: temp_dir.path().join("cache"),
            concurrency: Some(0),
            ..PipelineConfig::default()
        };
        let err = run_pipeline(&config, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!temp_dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_missing_model_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = PipelineConfig {
            cache_dir: temp_dir.path().join("cache"),
            ..PipelineConfig::default()
        };
        config.tools.whisper_model = temp_dir.path().join("missing.bin");
        let err = run_pipeline(&config, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_export_graph_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("cache"));
        store.ensure_root().unwrap();
        std::fs::write(store.path_for(1, StageKind::CrossReferenced), "2\n").unwrap();
        std::fs::write(store.path_for(2, StageKind::CrossReferenced), "").unwrap();
        std::fs::write(store.path_for(3, StageKind::CrossReferenced), "").unwrap();

        let out = export_graph(store.root(), "sg", &temp_dir.path().join("out")).unwrap();

        assert_eq!(out.file_name().unwrap(), "sg.gv");
        let dot = std::fs::read_to_string(out).unwrap();
        assert!(dot.contains("1 -> 2"));
        assert!(dot.contains("Standalone Episodes"));
    }
}
