use crate::pitch::{hz_to_midi, semitone_distance};
use log::debug;
use melograph_ports::notes::{Note, PitchFrame, MAX_MIDI_PITCH};
use std::collections::VecDeque;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SegmenterConfigError {
    #[error("window_size must be at least 1")]
    WindowSize,
    #[error("min_note_length must be finite and >= 0: {0}")]
    MinNoteLength(f64),
    #[error("min_magnitude must be finite: {0}")]
    MinMagnitude(f64),
    #[error("pitch_tolerance_semitones must be finite and > 0: {0}")]
    PitchTolerance(f64),
    #[error("pitch bounds must satisfy min <= max <= 127: {min}..={max}")]
    PitchBounds { min: u8, max: u8 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmenterConfig {
    pub window_size: usize,
    pub min_note_length: f64,
    pub min_magnitude: f64,
    pub pitch_tolerance_semitones: f64,
    pub min_pitch: u8,
    pub max_pitch: u8,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            min_note_length: 0.25,
            min_magnitude: 1.0,
            pitch_tolerance_semitones: 0.5,
            min_pitch: 36,
            max_pitch: 96,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), SegmenterConfigError> {
        if self.window_size == 0 {
            return Err(SegmenterConfigError::WindowSize);
        }
        if !self.min_note_length.is_finite() || self.min_note_length < 0.0 {
            return Err(SegmenterConfigError::MinNoteLength(self.min_note_length));
        }
        if !self.min_magnitude.is_finite() {
            return Err(SegmenterConfigError::MinMagnitude(self.min_magnitude));
        }
        if !self.pitch_tolerance_semitones.is_finite() || self.pitch_tolerance_semitones <= 0.0 {
            return Err(SegmenterConfigError::PitchTolerance(
                self.pitch_tolerance_semitones,
            ));
        }
        if self.min_pitch > self.max_pitch || self.max_pitch > MAX_MIDI_PITCH {
            return Err(SegmenterConfigError::PitchBounds {
                min: self.min_pitch,
                max: self.max_pitch,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct TrackedNote {
    /// Median frequency at onset. Not updated while the note is held.
    frequency: f64,
    onset: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Observation {
    Silence,
    Voiced(f64),
}

/// Everything the segmenter carries between frames. Threaded by value
/// through [`SegmenterState::step`].
#[derive(Clone, Debug)]
pub struct SegmenterState {
    window: VecDeque<(f64, f64)>,
    capacity: usize,
    tracked: Option<TrackedNote>,
    last_time: Option<f64>,
}

impl SegmenterState {
    pub fn new(config: &SegmenterConfig) -> Self {
        let capacity = config.window_size.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            tracked: None,
            last_time: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracked.is_some()
    }

    pub fn is_window_full(&self) -> bool {
        self.window.len() >= self.capacity
    }

    /// Onset of the pending note, if one is being tracked.
    pub fn pending_onset(&self) -> Option<f64> {
        self.tracked.map(|t| t.onset)
    }

    /// Feeds one frame. Returns the next state and, when a pending note was
    /// closed by this frame and survived the length/range gates, that note.
    pub fn step(mut self, frame: &PitchFrame, config: &SegmenterConfig) -> (Self, Option<Note>) {
        let frequency = if frame.is_voiced() { frame.frequency } else { 0.0 };
        let magnitude = if frame.magnitude.is_finite() {
            frame.magnitude
        } else {
            0.0
        };

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((frequency, magnitude));
        self.last_time = Some(frame.time);

        if !self.is_window_full() {
            return (self, None);
        }

        let now = frame.time;
        let observation = self.observe(config);
        let emitted = match (self.tracked, observation) {
            (None, Observation::Silence) => None,
            (None, Observation::Voiced(frequency)) => {
                debug!("onset at {now:.3}s ({frequency:.2} Hz)");
                self.tracked = Some(TrackedNote {
                    frequency,
                    onset: now,
                });
                None
            }
            (Some(tracked), Observation::Silence) => {
                self.tracked = None;
                close(tracked, now, config)
            }
            (Some(tracked), Observation::Voiced(frequency)) => {
                if semitone_distance(tracked.frequency, frequency)
                    > config.pitch_tolerance_semitones
                {
                    debug!(
                        "pitch change at {now:.3}s: {:.2} Hz -> {frequency:.2} Hz",
                        tracked.frequency
                    );
                    self.tracked = Some(TrackedNote {
                        frequency,
                        onset: now,
                    });
                    close(tracked, now, config)
                } else {
                    None
                }
            }
        };

        (self, emitted)
    }

    /// End of stream: closes a pending note at the last frame's time.
    pub fn finish(self, config: &SegmenterConfig) -> Option<Note> {
        match (self.tracked, self.last_time) {
            (Some(tracked), Some(last_time)) => close(tracked, last_time, config),
            _ => None,
        }
    }

    fn observe(&self, config: &SegmenterConfig) -> Observation {
        let mut frequencies: Vec<f64> = self.window.iter().map(|(f, _)| *f).collect();
        let mut magnitudes: Vec<f64> = self.window.iter().map(|(_, m)| *m).collect();
        let frequency = median(&mut frequencies);
        let magnitude = median(&mut magnitudes);

        if frequency <= 0.0 || magnitude < config.min_magnitude {
            Observation::Silence
        } else {
            Observation::Voiced(frequency)
        }
    }
}

fn close(tracked: TrackedNote, close_time: f64, config: &SegmenterConfig) -> Option<Note> {
    let duration = close_time - tracked.onset;
    if duration < config.min_note_length {
        debug!(
            "dropping note at {:.3}s: {duration:.3}s shorter than {:.3}s",
            tracked.onset, config.min_note_length
        );
        return None;
    }

    let pitch = hz_to_midi(tracked.frequency).round();
    if pitch < config.min_pitch as f64 || pitch > config.max_pitch as f64 {
        debug!(
            "dropping note at {:.3}s: pitch {pitch} outside {}..={}",
            tracked.onset, config.min_pitch, config.max_pitch
        );
        return None;
    }

    match Note::new(tracked.onset, pitch as i64, duration) {
        Ok(note) => Some(note),
        Err(err) => {
            debug!("dropping note at {:.3}s: {err}", tracked.onset);
            None
        }
    }
}

/// Middle value; mean of the two middle values for even lengths.
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

/// Drives [`SegmenterState`] over a whole frame sequence.
#[derive(Clone, Debug)]
pub struct NoteSegmenter {
    config: SegmenterConfig,
}

impl NoteSegmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self, SegmenterConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Raw, un-rounded notes in emission order. Silent or too-short input
    /// yields an empty vector.
    pub fn segment<I>(&self, frames: I) -> Vec<Note>
    where
        I: IntoIterator<Item = PitchFrame>,
    {
        let mut state = SegmenterState::new(&self.config);
        let mut notes = Vec::new();
        for frame in frames {
            let (next, emitted) = state.step(&frame, &self.config);
            state = next;
            notes.extend(emitted);
        }
        notes.extend(state.finish(&self.config));
        notes
    }
}
