//! Graphviz export. Layout and rendering are left to Graphviz itself.

use super::EpisodeGraph;
use crate::error::Result;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Render a strict `fdp` digraph with the standalone episodes grouped in a
/// filled cluster.
pub fn to_dot(graph: &EpisodeGraph, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "strict digraph G {{");
    let _ = writeln!(out, "\tgraph [layout=fdp overlap=prism overlap_scaling=-3.5]");
    for (from, to) in &graph.edges {
        let _ = writeln!(out, "\t{} -> {}", from, to);
    }
    let _ = writeln!(out, "\tsubgraph cluster_{}_0 {{", name);
    let _ = writeln!(out, "\t\tcolor=lightgrey style=filled");
    let _ = writeln!(out, "\t\tlabel=\"Standalone Episodes\"");
    for episode in &graph.standalone {
        let _ = writeln!(out, "\t\t{}", episode);
    }
    let _ = writeln!(out, "\t}}");
    let _ = writeln!(out, "}}");
    out
}

/// Write `<name>.gv` into `out_dir` and return its path.
pub fn write_dot(graph: &EpisodeGraph, name: &str, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}.gv", name));
    std::fs::write(&path, to_dot(graph, name))?;
    log::info!("Wrote graph description to {:?}", path);
    Ok(path)
}
