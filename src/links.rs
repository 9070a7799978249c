//! The `Episode<N>.links` file format: one cited episode number per line.
//! Blank lines and lines starting with `#` are ignored when reading.

use crate::error::{PipelineError, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Parse links file content into the set of cited episode numbers.
pub fn parse_links(content: &str) -> std::result::Result<BTreeSet<u32>, String> {
    let mut cited = BTreeSet::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = trimmed
            .parse::<u32>()
            .map_err(|e| format!("line {}: {:?} is not an episode number ({})", idx + 1, trimmed, e))?;
        cited.insert(number);
    }
    Ok(cited)
}

/// Render cited numbers ascending, one per line, each newline-terminated.
pub fn render_links(cited: &BTreeSet<u32>) -> String {
    let mut out = String::with_capacity(cited.len() * 4);
    for number in cited {
        out.push_str(&number.to_string());
        out.push('\n');
    }
    out
}

/// Read and parse a links file. Unreadable or malformed files are invalid artifacts.
pub fn read_links_file(path: &Path) -> Result<BTreeSet<u32>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::invalid_artifact(path, format!("unreadable links file: {}", e)))?;
    parse_links(&content).map_err(|reason| PipelineError::invalid_artifact(path, reason))
}
