//! Numbering gaps between the lowest and highest finished episode.

use crate::episode::StageKind;
use crate::error::{PipelineError, Result};
use crate::store::scan_artifacts;
use std::path::Path;

/// Every integer in `[first, last]` that is absent from `sorted`.
///
/// `sorted` must be strictly ascending. Single pass over the range with a
/// cursor into the input.
pub fn missing(sorted: &[u32]) -> Vec<u32> {
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    let mut gaps = Vec::new();
    let mut idx = 0;
    for candidate in first..=last {
        if sorted.get(idx) == Some(&candidate) {
            idx += 1;
        } else {
            gaps.push(candidate);
        }
    }
    gaps
}

/// Sorted, de-duplicated episode numbers of every `*<N>.links` file under `folder`.
pub fn scan_episode_numbers(folder: &Path) -> Result<Vec<u32>> {
    let mut numbers: Vec<u32> = scan_artifacts(folder, StageKind::CrossReferenced, true)?
        .into_iter()
        .map(|(number, _)| number)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    Ok(numbers)
}

/// Missing episode numbers for a folder of links files.
pub fn check_folder(folder: &Path) -> Result<Vec<u32>> {
    if !folder.is_dir() {
        return Err(PipelineError::Config(format!(
            "could not check for missing episodes because {:?} is not a valid folder",
            folder
        )));
    }
    let episodes = scan_episode_numbers(folder)?;
    log::debug!("Missing episodes of {:?}", episodes);
    Ok(missing(&episodes))
}
