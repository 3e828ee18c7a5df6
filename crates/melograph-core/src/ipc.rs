use melograph_ports::notes::NoteList;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Published by the player for every observable step of a run. Renderers and
/// loggers subscribe through [`crate::Player::subscribe`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerEvent {
    Started {
        total_notes: usize,
        total_duration: f64,
    },
    NoteDispatched {
        index: usize,
        elapsed: f64,
        pitch: u8,
        frequency: f64,
        duration: f64,
    },
    NoteSkipped {
        index: usize,
        reason: String,
    },
    Cancelled {
        cursor: usize,
    },
    Finished {
        dispatched: usize,
        skipped: usize,
    },
}

/// One-way messages from the analysis worker. A job always ends with exactly
/// one `Finished` or `Failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AnalysisStatus {
    Progress { message: String },
    Finished { notes: NoteList, saved_to: Option<PathBuf> },
    Failed { error: String },
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisStatus::Progress { .. })
    }
}
