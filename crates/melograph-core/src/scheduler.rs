use crate::clock::{Clock, StopFlag};
use crate::config::ConfigError;
use crate::ipc::PlayerEvent;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use melograph_domain_notes::midi_to_hz;
use melograph_ports::audio::{AudioStreamHandle, PlaybackHandle};
use melograph_ports::notes::{Note, NoteList};
use melograph_ports::synth::{SynthPort, ToneRequest};
use melograph_ports::types::Volume01;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerConfig {
    pub volume: Volume01,
    /// Sleep between dispatch passes. Bounds both onset lag and stop latency.
    pub poll_interval: Duration,
    /// Sleep between checks while waiting for the last notes to ring out.
    pub drain_poll_interval: Duration,
    pub stop_active_on_cancel: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: Volume01::new(0.5),
            poll_interval: Duration::from_millis(10),
            drain_poll_interval: Duration::from_millis(100),
            stop_active_on_cancel: true,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll_interval"));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("drain_poll_interval"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub outcome: PlaybackOutcome,
    pub dispatched: usize,
    pub skipped: usize,
    /// Index of the next note that would have been dispatched.
    pub cursor: usize,
}

struct ActivePlayback {
    index: usize,
    handle: Box<dyn PlaybackHandle>,
}

/// Replays a [`NoteList`] against a [`Clock`].
///
/// The list type guarantees ascending start times, so a single forward
/// cursor is enough: it only ever advances.
pub struct Player {
    notes: NoteList,
    config: PlayerConfig,
    synth: Arc<dyn SynthPort>,
    stop: StopFlag,
    cursor: usize,
    active: Vec<ActivePlayback>,
    dispatched: usize,
    skipped: usize,
    subscribers: Vec<Sender<PlayerEvent>>,
}

impl Player {
    pub fn new(
        notes: NoteList,
        config: PlayerConfig,
        synth: Arc<dyn SynthPort>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            notes,
            config,
            synth,
            stop: StopFlag::new(),
            cursor: 0,
            active: Vec::new(),
            dispatched: 0,
            skipped: 0,
            subscribers: Vec::new(),
        })
    }

    /// Handle that cancels this player from any thread.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn notes(&self) -> &NoteList {
        &self.notes
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.notes.len()
    }

    /// One dispatch pass at `elapsed`: starts every note whose start time has
    /// been reached, then drops finished playbacks. Returns how many notes
    /// were started. The stop flag is honoured between notes.
    pub fn poll(&mut self, elapsed: Duration, output: &dyn AudioStreamHandle) -> usize {
        let elapsed_secs = elapsed.as_secs_f64();
        let mut started = 0;

        while let Some(note) = self.notes.get(self.cursor).copied() {
            if note.start_time() > elapsed_secs || self.stop.is_stop_requested() {
                break;
            }
            let index = self.cursor;
            self.cursor += 1;
            if self.dispatch(index, note, elapsed_secs, output) {
                started += 1;
            }
        }

        self.reap();
        started
    }

    /// Runs to completion or cancellation. Blocks the calling thread.
    pub fn run(&mut self, output: &dyn AudioStreamHandle, clock: &dyn Clock) -> PlaybackSummary {
        self.publish(PlayerEvent::Started {
            total_notes: self.notes.len(),
            total_duration: self.notes.total_duration(),
        });
        info!(
            "playing {} notes ({:.1} s)",
            self.notes.len(),
            self.notes.total_duration()
        );

        loop {
            if self.stop.is_stop_requested() {
                return self.cancel();
            }
            self.poll(clock.now(), output);
            if self.is_exhausted() {
                break;
            }
            clock.sleep(self.config.poll_interval);
        }

        debug!("all notes dispatched, waiting on {} voices", self.active.len());
        while !self.active.is_empty() {
            if self.stop.is_stop_requested() {
                return self.cancel();
            }
            clock.sleep(self.config.drain_poll_interval);
            self.reap();
        }

        self.publish(PlayerEvent::Finished {
            dispatched: self.dispatched,
            skipped: self.skipped,
        });
        info!(
            "playback finished: {} played, {} skipped",
            self.dispatched, self.skipped
        );
        self.summary(PlaybackOutcome::Completed)
    }

    fn dispatch(
        &mut self,
        index: usize,
        note: Note,
        elapsed_secs: f64,
        output: &dyn AudioStreamHandle,
    ) -> bool {
        let frequency = midi_to_hz(note.pitch() as f64);
        let request = ToneRequest {
            frequency,
            duration: note.duration(),
            volume: self.config.volume,
            sample_rate_hz: output.sample_rate_hz(),
        };

        let started = self
            .synth
            .render_tone(&request)
            .map_err(|e| e.to_string())
            .and_then(|tone| output.play(tone).map_err(|e| e.to_string()));

        match started {
            Ok(handle) => {
                self.active.push(ActivePlayback { index, handle });
                self.dispatched += 1;
                info!(
                    "{elapsed_secs:.2}s: note {} ({frequency:.2} Hz) for {:.2}s",
                    note.pitch(),
                    note.duration()
                );
                self.publish(PlayerEvent::NoteDispatched {
                    index,
                    elapsed: elapsed_secs,
                    pitch: note.pitch(),
                    frequency,
                    duration: note.duration(),
                });
                true
            }
            Err(reason) => {
                self.skipped += 1;
                warn!("skipping note {index} (pitch {}): {reason}", note.pitch());
                self.publish(PlayerEvent::NoteSkipped { index, reason });
                false
            }
        }
    }

    fn reap(&mut self) {
        self.active.retain(|playback| {
            let active = playback.handle.is_active();
            if !active {
                debug!("note {} finished", playback.index);
            }
            active
        });
    }

    fn cancel(&mut self) -> PlaybackSummary {
        if self.config.stop_active_on_cancel {
            for playback in self.active.drain(..) {
                playback.handle.stop();
            }
        }
        info!("playback cancelled at note {}", self.cursor);
        self.publish(PlayerEvent::Cancelled {
            cursor: self.cursor,
        });
        self.summary(PlaybackOutcome::Cancelled)
    }

    fn summary(&self, outcome: PlaybackOutcome) -> PlaybackSummary {
        PlaybackSummary {
            outcome,
            dispatched: self.dispatched,
            skipped: self.skipped,
            cursor: self.cursor,
        }
    }

    fn publish(&mut self, event: PlayerEvent) {
        // Dropped receivers unsubscribe themselves.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
