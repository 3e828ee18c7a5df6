use melograph_ports::{Note, NoteError, NoteList, NoteListError, PitchFrame};
use pretty_assertions::assert_eq;

fn note(time: f64, pitch: i64, duration: f64) -> Note {
    Note::new(time, pitch, duration).expect("valid note")
}

#[test]
fn note_constructor_rejects_out_of_range_values() {
    assert_eq!(Note::new(0.0, 128, 1.0), Err(NoteError::PitchOutOfRange(128)));
    assert_eq!(Note::new(0.0, -1, 1.0), Err(NoteError::PitchOutOfRange(-1)));
    assert_eq!(Note::new(0.0, 60, 0.0), Err(NoteError::InvalidDuration(0.0)));
    assert_eq!(Note::new(-0.1, 60, 1.0), Err(NoteError::InvalidStartTime(-0.1)));
    assert!(Note::new(0.0, 60, f64::NAN).is_err());
    assert!(Note::new(0.0, 127, 0.1).is_ok());
}

#[test]
fn unvoiced_frames_are_detected() {
    assert!(PitchFrame::new(0.0, 440.0, 1.0).is_voiced());
    assert!(!PitchFrame::new(0.0, 0.0, 1.0).is_voiced());
    assert!(!PitchFrame::new(0.0, -5.0, 1.0).is_voiced());
    assert!(!PitchFrame::new(0.0, f64::NAN, 1.0).is_voiced());
}

#[test]
fn from_sorted_rejects_unsorted_and_duplicates() {
    let unsorted = vec![note(0.5, 60, 0.3), note(0.1, 62, 0.3)];
    assert_eq!(NoteList::from_sorted(unsorted), Err(NoteListError::Unsorted(1)));

    let duplicated = vec![note(0.1, 60, 0.3), note(0.1, 64, 0.3), note(0.1, 60, 0.5)];
    assert!(matches!(
        NoteList::from_sorted(duplicated),
        Err(NoteListError::Duplicate { index: 2, pitch: 60, .. })
    ));
}

#[test]
fn normalize_sorts_stably_and_keeps_first_duplicate() {
    let list = NoteList::normalize(vec![
        note(0.5, 64, 0.3),
        note(0.0, 60, 0.4),
        note(0.5, 62, 0.2),
        note(0.5, 64, 0.9),
    ]);

    assert_eq!(
        list.notes(),
        &[note(0.0, 60, 0.4), note(0.5, 64, 0.3), note(0.5, 62, 0.2)]
    );
    assert!((list.total_duration() - 0.8).abs() < 1e-9);
}

#[test]
fn json_wire_format_round_trips_field_names() {
    let list = NoteList::from_sorted(vec![note(0.0, 69, 1.0)]).unwrap();
    let json = serde_json::to_value(&list).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "notes": [ { "time": 0.0, "pitch": 69, "duration": 1.0 } ] })
    );
}

#[test]
fn loading_sorts_entries_and_rejects_bad_documents() {
    let loaded: NoteList = serde_json::from_str(
        r#"{ "notes": [ { "time": 1.0, "pitch": 62, "duration": 0.5 },
                        { "time": 0.0, "pitch": 60, "duration": 0.5 } ] }"#,
    )
    .unwrap();
    assert_eq!(loaded.notes(), &[note(0.0, 60, 0.5), note(1.0, 62, 0.5)]);

    assert!(serde_json::from_str::<NoteList>(r#"{ "events": [] }"#).is_err());
    assert!(serde_json::from_str::<NoteList>("{ not json").is_err());
    assert!(serde_json::from_str::<NoteList>(
        r#"{ "notes": [ { "time": 0.0, "pitch": 200, "duration": 0.5 } ] }"#
    )
    .is_err());
    assert!(serde_json::from_str::<NoteList>(
        r#"{ "notes": [ { "time": 0.0, "pitch": 60, "duration": 0.5 },
                        { "time": 0.0, "pitch": 60, "duration": 0.7 } ] }"#
    )
    .is_err());
}
