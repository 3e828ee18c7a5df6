pub const A4_MIDI: f64 = 69.0;
pub const A4_HZ: f64 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Fractional MIDI pitch for a frequency in Hz. Only meaningful for `hz > 0`.
pub fn hz_to_midi(hz: f64) -> f64 {
    A4_MIDI + 12.0 * (hz / A4_HZ).log2()
}

pub fn midi_to_hz(midi: f64) -> f64 {
    A4_HZ * 2.0_f64.powf((midi - A4_MIDI) / 12.0)
}

/// Distance between two frequencies in semitones, always non-negative.
pub fn semitone_distance(a_hz: f64, b_hz: f64) -> f64 {
    (hz_to_midi(a_hz) - hz_to_midi(b_hz)).abs()
}

/// Scientific pitch name, e.g. `60` -> `C4`.
pub fn note_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[midi as usize % 12], octave)
}
