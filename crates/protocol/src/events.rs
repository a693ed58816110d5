use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::StatusMap;

/// Events the daemon pushes over the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusEvent {
    /// A repository's status changed. `changes` carries only the paths whose
    /// state differs from the previous snapshot; removed paths appear with
    /// `Unversioned`. An empty change set is valid and marks a scan attempt
    /// that found nothing new (or a transition to clean).
    RepositoryStatusChanged { root: PathBuf, changes: StatusMap },
    /// A repository was registered for the first time.
    RepositoryDiscovered { root: PathBuf },
}

impl BusEvent {
    /// Repository root the event concerns.
    pub fn root(&self) -> &PathBuf {
        match self {
            BusEvent::RepositoryStatusChanged { root, .. } => root,
            BusEvent::RepositoryDiscovered { root } => root,
        }
    }
}
