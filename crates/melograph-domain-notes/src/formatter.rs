use log::debug;
use melograph_ports::notes::{Note, NoteList};

/// Rounds to one decimal place, ties away from zero (`0.25 -> 0.3`,
/// `1.25 -> 1.3`). Applying it twice gives the same value as applying it once.
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Canonical exchange form: start times and durations rounded to tenths,
/// stable-sorted by start time, first occurrence kept per `(start_time, pitch)`.
///
/// A note whose duration rounds to zero cannot be represented and is dropped.
pub fn format_notes(raw: &[Note]) -> NoteList {
    let rounded = raw
        .iter()
        .filter_map(|note| {
            let start_time = round_tenths(note.start_time());
            let duration = round_tenths(note.duration());
            match Note::new(start_time, note.pitch() as i64, duration) {
                Ok(rounded) => Some(rounded),
                Err(err) => {
                    debug!("dropping note {note:?} after rounding: {err}");
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    NoteList::normalize(rounded)
}
