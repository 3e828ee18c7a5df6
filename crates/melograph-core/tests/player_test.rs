use melograph_core::{
    Clock, PlaybackOutcome, PlaybackSession, Player, PlayerConfig, PlayerError, PlayerEvent,
    StopFlag, SystemClock,
};
use melograph_ports::audio::{AudioError, AudioOutputPort, AudioStreamHandle, PlaybackHandle};
use melograph_ports::notes::{Note, NoteList};
use melograph_ports::synth::{SynthError, SynthPort, ToneBuffer, ToneRequest};
use melograph_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, SampleRateHz};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_RATE: SampleRateHz = 1_000;

/// Virtual time: `sleep` advances `now` instantly. Optionally raises a stop
/// flag once a given instant is reached.
struct ManualClock {
    now: Mutex<Duration>,
    cancel_at: Mutex<Option<(Duration, StopFlag)>>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Duration::ZERO),
            cancel_at: Mutex::new(None),
        })
    }

    fn cancel_at(&self, at: Duration, stop: StopFlag) {
        *self.cancel_at.lock() = Some((at, stop));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        let now = {
            let mut now = self.now.lock();
            *now += duration;
            *now
        };
        if let Some((at, stop)) = self.cancel_at.lock().as_ref() {
            if now >= *at {
                stop.request_stop();
            }
        }
    }
}

/// Renders silence of the requested length; fails for one pitch if asked to.
struct FakeSynth {
    fail_above_hz: Option<f64>,
}

impl SynthPort for FakeSynth {
    fn render_tone(&self, request: &ToneRequest) -> Result<ToneBuffer, SynthError> {
        if let Some(limit) = self.fail_above_hz {
            if request.frequency > limit {
                return Err(SynthError::Backend("voice limit".to_string()));
            }
        }
        let len = (request.duration * request.sample_rate_hz as f64).round() as usize;
        Ok(ToneBuffer {
            sample_rate_hz: request.sample_rate_hz,
            samples: vec![0.0; len],
        })
    }
}

#[derive(Clone)]
struct Voice {
    started: Duration,
    end: Duration,
    stopped: Arc<AtomicBool>,
}

/// Output that never touches a device: a voice counts as sounding until
/// the clock passes its buffer's length.
struct FakeOutput {
    clock: Arc<dyn Clock>,
    voices: Arc<Mutex<Vec<Voice>>>,
    max_polyphony: Arc<Mutex<usize>>,
}

impl FakeOutput {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            voices: Arc::new(Mutex::new(Vec::new())),
            max_polyphony: Arc::new(Mutex::new(0)),
        }
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().clone()
    }
}

struct FakeHandle {
    clock: Arc<dyn Clock>,
    end: Duration,
    stopped: Arc<AtomicBool>,
}

impl PlaybackHandle for FakeHandle {
    fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.clock.now() < self.end
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl AudioStreamHandle for FakeOutput {
    fn sample_rate_hz(&self) -> SampleRateHz {
        SAMPLE_RATE
    }

    fn play(&self, tone: ToneBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        let now = self.clock.now();
        let voice = Voice {
            started: now,
            end: now + Duration::from_secs_f64(tone.duration_secs()),
            stopped: Arc::new(AtomicBool::new(false)),
        };

        let mut voices = self.voices.lock();
        voices.push(voice.clone());
        let sounding = voices
            .iter()
            .filter(|v| !v.stopped.load(Ordering::SeqCst) && now < v.end)
            .count();
        let mut max = self.max_polyphony.lock();
        *max = (*max).max(sounding);

        Ok(Box::new(FakeHandle {
            clock: self.clock.clone(),
            end: voice.end,
            stopped: voice.stopped,
        }))
    }

    fn close(self: Box<Self>) {}
}

fn notes(entries: &[(f64, i64, f64)]) -> NoteList {
    let notes = entries
        .iter()
        .map(|&(time, pitch, duration)| Note::new(time, pitch, duration).expect("valid note"))
        .collect();
    NoteList::from_sorted(notes).expect("sorted notes")
}

fn player(list: NoteList, synth: FakeSynth) -> Player {
    Player::new(list, PlayerConfig::default(), Arc::new(synth)).expect("valid config")
}

fn drain(rx: &crossbeam_channel::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    rx.try_iter().collect()
}

#[test]
fn overlapping_notes_are_dispatched_in_order_and_sound_together() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let mut player = player(
        notes(&[(0.0, 60, 0.3), (0.1, 64, 0.3)]),
        FakeSynth { fail_above_hz: None },
    );
    let events = player.subscribe();

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Completed);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.cursor, 2);

    let voices = output.voices();
    assert_eq!(voices.len(), 2);
    let poll = Duration::from_millis(10);
    assert!(voices[0].started <= poll);
    assert!(voices[1].started >= Duration::from_millis(100));
    assert!(voices[1].started <= Duration::from_millis(100) + poll);
    assert_eq!(*output.max_polyphony.lock(), 2);

    // Finished only after the second note rang out.
    assert!(clock.now() >= Duration::from_millis(400));
    let events = drain(&events);
    assert_eq!(
        events.first(),
        Some(&PlayerEvent::Started {
            total_notes: 2,
            total_duration: notes(&[(0.0, 60, 0.3), (0.1, 64, 0.3)]).total_duration(),
        })
    );
    assert_eq!(
        events.last(),
        Some(&PlayerEvent::Finished {
            dispatched: 2,
            skipped: 0
        })
    );
}

#[test]
fn no_note_starts_before_its_start_time() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let list = notes(&[(0.0, 60, 0.1), (0.05, 62, 0.1), (0.12, 64, 0.1), (0.3, 65, 0.1)]);
    let starts: Vec<f64> = list.iter().map(Note::start_time).collect();
    let mut player = player(list, FakeSynth { fail_above_hz: None });

    player.run(&output, clock.as_ref());

    let voices = output.voices();
    assert_eq!(voices.len(), starts.len());
    for (voice, start) in voices.iter().zip(starts) {
        let started = voice.started.as_secs_f64();
        assert!(started >= start - 1e-9, "{started} < {start}");
        assert!(started - start <= 0.01 + 1e-9, "{started} lags {start}");
    }
}

#[test]
fn stop_request_cancels_and_silences_active_voices() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let mut player = player(
        notes(&[
            (0.0, 60, 0.5),
            (0.1, 62, 0.5),
            (0.2, 64, 0.5),
            (0.3, 65, 0.5),
            (0.4, 67, 0.5),
        ]),
        FakeSynth { fail_above_hz: None },
    );
    clock.cancel_at(Duration::from_millis(250), player.stop_flag());
    let events = player.subscribe();

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(summary.cursor, 3);
    assert_eq!(summary.dispatched, 3);
    let voices = output.voices();
    assert_eq!(voices.len(), 3);
    assert!(voices.iter().all(|v| v.stopped.load(Ordering::SeqCst)));
    assert_eq!(
        drain(&events).last(),
        Some(&PlayerEvent::Cancelled { cursor: 3 })
    );
}

#[test]
fn cancel_can_leave_voices_ringing() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let config = PlayerConfig {
        stop_active_on_cancel: false,
        ..PlayerConfig::default()
    };
    let mut player = Player::new(
        notes(&[(0.0, 60, 1.0), (0.5, 62, 1.0)]),
        config,
        Arc::new(FakeSynth { fail_above_hz: None }),
    )
    .expect("valid config");
    clock.cancel_at(Duration::from_millis(200), player.stop_flag());

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(summary.cursor, 1);
    assert!(!output.voices()[0].stopped.load(Ordering::SeqCst));
}

#[test]
fn stop_during_drain_cancels() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let mut player = player(notes(&[(0.0, 60, 2.0)]), FakeSynth { fail_above_hz: None });
    clock.cancel_at(Duration::from_millis(500), player.stop_flag());

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(summary.cursor, 1);
    assert!(clock.now() < Duration::from_secs(2));
    assert!(output.voices()[0].stopped.load(Ordering::SeqCst));
}

#[test]
fn failed_note_is_skipped_and_playback_continues() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    // Only the top note (MIDI 72, ~523 Hz) fails to render.
    let mut player = player(
        notes(&[(0.0, 60, 0.1), (0.1, 72, 0.1), (0.2, 64, 0.1)]),
        FakeSynth {
            fail_above_hz: Some(500.0),
        },
    );
    let events = player.subscribe();

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Completed);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.cursor, 3);
    assert_eq!(output.voices().len(), 2);
    assert!(drain(&events)
        .iter()
        .any(|e| matches!(e, PlayerEvent::NoteSkipped { index: 1, .. })));
}

#[test]
fn empty_list_finishes_immediately() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let mut player = player(NoteList::default(), FakeSynth { fail_above_hz: None });
    let events = player.subscribe();

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Completed);
    assert_eq!(clock.now(), Duration::ZERO);
    assert_eq!(
        drain(&events),
        vec![
            PlayerEvent::Started {
                total_notes: 0,
                total_duration: 0.0
            },
            PlayerEvent::Finished {
                dispatched: 0,
                skipped: 0
            },
        ]
    );
}

#[test]
fn poll_only_starts_due_notes() {
    let clock = ManualClock::new();
    let output = FakeOutput::new(clock.clone());
    let mut player = player(
        notes(&[(0.0, 60, 0.1), (0.0, 64, 0.1), (0.1, 67, 0.1)]),
        FakeSynth { fail_above_hz: None },
    );

    assert_eq!(player.poll(Duration::from_millis(50), &output), 2);
    assert_eq!(player.cursor(), 2);
    assert_eq!(player.active_count(), 2);
    assert!(!player.is_exhausted());

    assert_eq!(player.poll(Duration::from_millis(60), &output), 0);
    assert_eq!(player.poll(Duration::from_millis(100), &output), 1);
    assert!(player.is_exhausted());
}

#[test]
fn zero_poll_interval_is_rejected() {
    let config = PlayerConfig {
        poll_interval: Duration::ZERO,
        ..PlayerConfig::default()
    };
    let result = Player::new(
        NoteList::default(),
        config,
        Arc::new(FakeSynth { fail_above_hz: None }),
    );
    assert!(result.is_err());
}

#[test]
fn plays_against_the_system_clock() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::start());
    let output = FakeOutput::new(clock.clone());
    let mut player = player(
        notes(&[(0.0, 60, 0.05), (0.05, 64, 0.05)]),
        FakeSynth { fail_above_hz: None },
    );
    let events = player.subscribe();

    let summary = player.run(&output, clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Completed);
    assert_eq!(summary.dispatched, 2);
    let second = drain(&events).into_iter().find_map(|e| match e {
        PlayerEvent::NoteDispatched {
            index: 1, elapsed, ..
        } => Some(elapsed),
        _ => None,
    });
    assert!(second.is_some_and(|elapsed| elapsed >= 0.05));
}

/// Hands out one [`FakeOutput`] and remembers whether it was closed.
struct FakeAudioPort {
    clock: Arc<dyn Clock>,
    closed: Arc<AtomicBool>,
}

struct ClosingOutput {
    inner: FakeOutput,
    closed: Arc<AtomicBool>,
}

impl AudioStreamHandle for ClosingOutput {
    fn sample_rate_hz(&self) -> SampleRateHz {
        self.inner.sample_rate_hz()
    }

    fn play(&self, tone: ToneBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        self.inner.play(tone)
    }

    fn close(self: Box<Self>) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl AudioOutputPort for FakeAudioPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        Ok(vec![AudioOutputDevice {
            id: DeviceId("fake:0".to_string()),
            name: "Fake".to_string(),
            default_config: AudioConfig::mono(SAMPLE_RATE),
        }])
    }

    fn open_output(
        &self,
        device_id: Option<&DeviceId>,
        _config: AudioConfig,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        if let Some(id) = device_id {
            if id.0 != "fake:0" {
                return Err(AudioError::DeviceNotFound(id.to_string()));
            }
        }
        Ok(Box::new(ClosingOutput {
            inner: FakeOutput::new(self.clock.clone()),
            closed: self.closed.clone(),
        }))
    }
}

#[test]
fn session_runs_and_closes_the_output() {
    let clock = ManualClock::new();
    let port = FakeAudioPort {
        clock: clock.clone(),
        closed: Arc::new(AtomicBool::new(false)),
    };

    let mut session = PlaybackSession::open(
        notes(&[(0.0, 60, 0.2), (0.1, 62, 0.2)]),
        PlayerConfig::default(),
        Arc::new(FakeSynth { fail_above_hz: None }),
        &port,
        Some(&DeviceId("fake:0".to_string())),
        SAMPLE_RATE,
    )
    .expect("session opens");
    let events = session.subscribe();

    let summary = session.run(clock.as_ref());

    assert_eq!(summary.outcome, PlaybackOutcome::Completed);
    assert_eq!(summary.dispatched, 2);
    assert!(port.closed.load(Ordering::SeqCst));
    assert!(matches!(
        drain(&events).last(),
        Some(PlayerEvent::Finished { dispatched: 2, .. })
    ));
}

#[test]
fn session_reports_unknown_device() {
    let port = FakeAudioPort {
        clock: ManualClock::new(),
        closed: Arc::new(AtomicBool::new(false)),
    };

    let result = PlaybackSession::open(
        NoteList::default(),
        PlayerConfig::default(),
        Arc::new(FakeSynth { fail_above_hz: None }),
        &port,
        Some(&DeviceId("usb:7".to_string())),
        SAMPLE_RATE,
    );

    assert!(matches!(
        result,
        Err(PlayerError::Audio(AudioError::DeviceNotFound(_)))
    ));
}
