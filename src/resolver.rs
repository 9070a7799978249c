use crate::episode::StageKind;
use crate::store::ArtifactStore;
use serde::Serialize;

/// Where an episode stands according to durable state alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Most advanced stage with a usable artifact.
    pub already_at: Option<StageKind>,
    /// Stages still to run, ascending.
    pub remaining: Vec<StageKind>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

pub struct StageResolver<'a> {
    store: &'a ArtifactStore,
}

impl<'a> StageResolver<'a> {
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    /// Probe from the most advanced stage down and stop at the first usable
    /// artifact. A later artifact implies every earlier stage succeeded, even
    /// if those artifacts were reclaimed since.
    pub fn resolve(&self, number: u32) -> Resolution {
        let mut already_at = None;
        for stage in StageKind::ALL.iter().rev().copied() {
            match self.store.probe(number, stage) {
                Ok(Some(_)) => {
                    already_at = Some(stage);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!(
                        "Ignoring cached {} artifact of episode {}: {}",
                        stage,
                        number,
                        e
                    );
                }
            }
        }

        Resolution {
            already_at,
            remaining: StageKind::after(already_at),
        }
    }
}
