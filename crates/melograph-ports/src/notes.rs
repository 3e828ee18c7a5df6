use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MAX_MIDI_PITCH: u8 = 127;

/// One analysis frame from an external pitch tracker.
///
/// A non-positive (or non-finite) frequency marks the frame as unvoiced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchFrame {
    pub time: f64,
    pub frequency: f64,
    pub magnitude: f64,
}

impl PitchFrame {
    pub fn new(time: f64, frequency: f64, magnitude: f64) -> Self {
        Self {
            time,
            frequency,
            magnitude,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency.is_finite() && self.frequency > 0.0
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NoteError {
    #[error("pitch out of range 0..=127: {0}")]
    PitchOutOfRange(i64),
    #[error("duration must be finite and > 0: {0}")]
    InvalidDuration(f64),
    #[error("start time must be finite and >= 0: {0}")]
    InvalidStartTime(f64),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NoteListError {
    #[error("invalid note at index {index}: {source}")]
    InvalidNote {
        index: usize,
        #[source]
        source: NoteError,
    },
    #[error("notes not sorted by start time at index {0}")]
    Unsorted(usize),
    #[error("duplicate note (time {time}, pitch {pitch}) at index {index}")]
    Duplicate { index: usize, time: f64, pitch: u8 },
}

/// A discrete note event. Construction validates every field, so a `Note`
/// held anywhere downstream is always in range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NoteDto", into = "NoteDto")]
pub struct Note {
    start_time: f64,
    pitch: u8,
    duration: f64,
}

impl Note {
    pub fn new(start_time: f64, pitch: i64, duration: f64) -> Result<Self, NoteError> {
        if !start_time.is_finite() || start_time < 0.0 {
            return Err(NoteError::InvalidStartTime(start_time));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(NoteError::InvalidDuration(duration));
        }
        if !(0..=MAX_MIDI_PITCH as i64).contains(&pitch) {
            return Err(NoteError::PitchOutOfRange(pitch));
        }
        Ok(Self {
            start_time,
            pitch: pitch as u8,
            duration,
        })
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    fn same_slot(&self, other: &Note) -> bool {
        self.start_time == other.start_time && self.pitch == other.pitch
    }
}

/// Wire shape of a single note: `{ "time", "pitch", "duration" }`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteDto {
    pub time: f64,
    pub pitch: i64,
    pub duration: f64,
}

impl TryFrom<NoteDto> for Note {
    type Error = NoteError;

    fn try_from(dto: NoteDto) -> Result<Self, Self::Error> {
        Note::new(dto.time, dto.pitch, dto.duration)
    }
}

impl From<Note> for NoteDto {
    fn from(note: Note) -> Self {
        Self {
            time: note.start_time,
            pitch: note.pitch as i64,
            duration: note.duration,
        }
    }
}

/// Wire shape of a note file: `{ "notes": [...] }`. The `notes` key is required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteFileDto {
    pub notes: Vec<NoteDto>,
}

/// Notes ordered by non-decreasing start time, unique on `(start_time, pitch)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NoteFileDto", into = "NoteFileDto")]
pub struct NoteList {
    notes: Vec<Note>,
}

impl NoteList {
    /// Accepts notes that already satisfy the ordering and uniqueness invariants.
    pub fn from_sorted(notes: Vec<Note>) -> Result<Self, NoteListError> {
        for (index, pair) in notes.windows(2).enumerate() {
            if pair[1].start_time < pair[0].start_time {
                return Err(NoteListError::Unsorted(index + 1));
            }
        }
        if let Some(index) = first_duplicate(&notes) {
            let note = notes[index];
            return Err(NoteListError::Duplicate {
                index,
                time: note.start_time,
                pitch: note.pitch,
            });
        }
        Ok(Self { notes })
    }

    /// Stable-sorts by start time, then keeps only the first note of every
    /// `(start_time, pitch)` slot. Durations of dropped notes are discarded.
    pub fn normalize(mut notes: Vec<Note>) -> Self {
        notes.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(Ordering::Equal)
        });

        let mut kept: Vec<Note> = Vec::with_capacity(notes.len());
        let mut group_start = 0;
        for note in notes {
            if kept
                .get(group_start)
                .map_or(true, |first| first.start_time != note.start_time)
            {
                group_start = kept.len();
            }
            if kept[group_start..].iter().any(|k| k.same_slot(&note)) {
                continue;
            }
            kept.push(note);
        }

        Self { notes: kept }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Note> {
        self.notes.iter()
    }

    /// Latest end time over all notes, 0.0 for an empty list.
    pub fn total_duration(&self) -> f64 {
        self.notes
            .iter()
            .map(Note::end_time)
            .fold(0.0, f64::max)
    }

    pub fn into_vec(self) -> Vec<Note> {
        self.notes
    }
}

impl<'a> IntoIterator for &'a NoteList {
    type Item = &'a Note;
    type IntoIter = std::slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

impl TryFrom<NoteFileDto> for NoteList {
    type Error = NoteListError;

    fn try_from(dto: NoteFileDto) -> Result<Self, Self::Error> {
        let mut notes = dto
            .notes
            .into_iter()
            .enumerate()
            .map(|(index, note)| {
                Note::try_from(note).map_err(|source| NoteListError::InvalidNote { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Files written by hand are not always ordered; duplicates still are an error.
        notes.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(Ordering::Equal)
        });
        NoteList::from_sorted(notes)
    }
}

impl From<NoteList> for NoteFileDto {
    fn from(list: NoteList) -> Self {
        Self {
            notes: list.notes.into_iter().map(NoteDto::from).collect(),
        }
    }
}

fn first_duplicate(sorted: &[Note]) -> Option<usize> {
    let mut group_start = 0;
    for index in 1..sorted.len() {
        if sorted[index].start_time != sorted[group_start].start_time {
            group_start = index;
            continue;
        }
        if sorted[group_start..index]
            .iter()
            .any(|prev| prev.same_slot(&sorted[index]))
        {
            return Some(index);
        }
    }
    None
}
