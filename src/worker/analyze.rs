use regex::Regex;
use std::collections::BTreeSet;

/// Finds citations of other episodes in a transcript.
#[derive(Clone)]
pub struct CitationExtractor {
    pattern: Regex,
}

impl CitationExtractor {
    /// `pattern` is expected to be case-insensitive with the cited number in
    /// capture group 1 (see `PipelineConfig::citation_regex`).
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }

    /// Distinct episode numbers cited in `transcript`, never including `own`.
    pub fn extract(&self, transcript: &str, own: u32) -> BTreeSet<u32> {
        let mut cited: BTreeSet<u32> = self
            .pattern
            .captures_iter(transcript)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().parse::<u32>().ok())
            .collect();
        cited.remove(&own);
        cited
    }
}
