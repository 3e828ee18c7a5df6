use crate::ipc::AnalysisStatus;
use crossbeam_channel::{Receiver, Sender};
use log::{error, info};
use melograph_domain_notes::{format_notes, NoteSegmenter};
use melograph_ports::notes::NoteList;
use melograph_ports::pitch::{PitchError, PitchTrackerPort};
use melograph_ports::storage::{StorageError, StoragePort};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Frames between two progress messages.
const PROGRESS_EVERY_FRAMES: usize = 2_000;

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("pitch tracking failed: {0}")]
    Pitch(#[from] PitchError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("analysis failed: {0}")]
    Failed(String),
    #[error("analysis worker stopped without a result")]
    Disconnected,
}

#[derive(Clone, Debug)]
pub struct AnalysisJob {
    pub input: PathBuf,
    /// Where to write the note file; `None` keeps the result in memory only.
    pub output: Option<PathBuf>,
}

/// Owner side of a running analysis. Dropping it detaches the worker.
pub struct AnalysisHandle {
    status: Receiver<AnalysisStatus>,
    join: Option<JoinHandle<()>>,
}

impl AnalysisHandle {
    /// Status stream; never blocks the worker.
    pub fn status(&self) -> &Receiver<AnalysisStatus> {
        &self.status
    }

    /// Blocks until the job ends, handing every progress message to `on_progress`.
    pub fn wait(mut self, mut on_progress: impl FnMut(&str)) -> Result<NoteList, AnalysisError> {
        let result = loop {
            match self.status.recv() {
                Ok(AnalysisStatus::Progress { message }) => on_progress(&message),
                Ok(AnalysisStatus::Finished { notes, .. }) => break Ok(notes),
                Ok(AnalysisStatus::Failed { error }) => break Err(AnalysisError::Failed(error)),
                Err(_) => break Err(AnalysisError::Disconnected),
            }
        };
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        result
    }
}

/// Runs pitch tracking, segmentation, formatting and (optionally) saving on a
/// dedicated thread. Progress and the final result arrive on the returned
/// handle's status channel.
pub fn spawn_analysis(
    tracker: Arc<dyn PitchTrackerPort>,
    storage: Arc<dyn StoragePort>,
    segmenter: NoteSegmenter,
    job: AnalysisJob,
) -> Result<AnalysisHandle, AnalysisError> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let join = thread::Builder::new()
        .name("melograph-analysis".to_string())
        .spawn(move || {
            let terminal = match run_analysis(tracker.as_ref(), storage.as_ref(), &segmenter, &job, &tx)
            {
                Ok((notes, saved_to)) => AnalysisStatus::Finished { notes, saved_to },
                Err(err) => {
                    error!("analysis of {} failed: {err}", job.input.display());
                    AnalysisStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            let _ = tx.send(terminal);
        })
        .map_err(|e| AnalysisError::Failed(e.to_string()))?;

    Ok(AnalysisHandle {
        status: rx,
        join: Some(join),
    })
}

fn run_analysis(
    tracker: &dyn PitchTrackerPort,
    storage: &dyn StoragePort,
    segmenter: &NoteSegmenter,
    job: &AnalysisJob,
    tx: &Sender<AnalysisStatus>,
) -> Result<(NoteList, Option<PathBuf>), AnalysisError> {
    let progress = |message: String| {
        info!("{message}");
        let _ = tx.send(AnalysisStatus::Progress { message });
    };

    progress(format!("loading {}", job.input.display()));
    let frames = tracker.track(&job.input)?;

    progress("extracting pitches and segmenting".to_string());
    let mut frame_count = 0usize;
    let raw = segmenter.segment(frames.inspect(|_| {
        frame_count += 1;
        if frame_count % PROGRESS_EVERY_FRAMES == 0 {
            let _ = tx.send(AnalysisStatus::Progress {
                message: format!("{frame_count} frames analysed"),
            });
        }
    }));

    progress(format!("formatting {} raw notes", raw.len()));
    let notes = format_notes(&raw);

    let saved_to = match &job.output {
        Some(path) => {
            storage.save_notes(path, &notes)?;
            progress(format!("saved {} notes to {}", notes.len(), path.display()));
            Some(path.clone())
        }
        None => None,
    };

    Ok((notes, saved_to))
}
