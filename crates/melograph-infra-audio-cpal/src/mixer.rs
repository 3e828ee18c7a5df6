use melograph_ports::audio::{AudioError, PlaybackHandle};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Most voices the mixer will sum at once. Extra voices wait in the queue.
pub const MAX_VOICES: usize = 256;

const LIMIT: f32 = 0.98;

/// Shared between the control side and the audio callback.
#[derive(Debug)]
pub struct VoiceState {
    active: AtomicBool,
    stop_requested: AtomicBool,
}

impl VoiceState {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            stop_requested: AtomicBool::new(false),
        }
    }
}

struct Voice {
    samples: Vec<f32>,
    position: usize,
    state: Arc<VoiceState>,
}

impl Voice {
    fn is_done(&self) -> bool {
        self.position >= self.samples.len() || self.state.stop_requested.load(Ordering::Relaxed)
    }
}

/// A queued or sounding tone, as seen by the scheduler.
pub struct VoiceHandle {
    state: Arc<VoiceState>,
}

impl PlaybackHandle for VoiceHandle {
    fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::Relaxed);
    }
}

/// Control side of the voice queue.
pub struct VoiceSender {
    incoming: Producer<Voice>,
    retired: Consumer<Voice>,
}

impl VoiceSender {
    pub fn send(&mut self, samples: Vec<f32>) -> Result<VoiceHandle, AudioError> {
        // Buffers are freed here rather than on the audio thread.
        while self.retired.pop().is_ok() {}

        let state = Arc::new(VoiceState::new());
        let voice = Voice {
            samples,
            position: 0,
            state: state.clone(),
        };
        self.incoming
            .push(voice)
            .map_err(|_| AudioError::Backend("voice queue full".to_string()))?;
        Ok(VoiceHandle { state })
    }
}

/// Audio side: sums active voices into a mono buffer.
pub struct Mixer {
    incoming: Consumer<Voice>,
    retired: Producer<Voice>,
    voices: Vec<Voice>,
    limiter_gain: f32,
}

pub fn voice_queue() -> (VoiceSender, Mixer) {
    let (incoming_tx, incoming_rx) = RingBuffer::new(MAX_VOICES);
    let (retired_tx, retired_rx) = RingBuffer::new(MAX_VOICES);
    (
        VoiceSender {
            incoming: incoming_tx,
            retired: retired_rx,
        },
        Mixer {
            incoming: incoming_rx,
            retired: retired_tx,
            voices: Vec::with_capacity(MAX_VOICES),
            limiter_gain: 1.0,
        },
    )
}

impl Mixer {
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Fills `out` with the sum of every sounding voice. Never allocates.
    pub fn render(&mut self, out: &mut [f32]) {
        while self.voices.len() < MAX_VOICES {
            match self.incoming.pop() {
                Ok(voice) => self.voices.push(voice),
                Err(_) => break,
            }
        }

        out.fill(0.0);
        for voice in self.voices.iter_mut() {
            if voice.state.stop_requested.load(Ordering::Relaxed) {
                continue;
            }
            let remaining = &voice.samples[voice.position.min(voice.samples.len())..];
            let n = remaining.len().min(out.len());
            for (o, s) in out[..n].iter_mut().zip(remaining) {
                *o += *s;
            }
            voice.position += n;
        }

        self.apply_limiter(out);
        self.retire_finished();
    }

    fn apply_limiter(&mut self, out: &mut [f32]) {
        let peak = out.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()));
        let target_gain = if peak > LIMIT { LIMIT / peak } else { 1.0 };
        let coeff = if target_gain < self.limiter_gain {
            0.25
        } else {
            0.01
        };
        self.limiter_gain =
            (self.limiter_gain + coeff * (target_gain - self.limiter_gain)).clamp(0.0, 1.0);

        // Attack is smoothed, so clamp whatever still overshoots.
        let gain = self.limiter_gain;
        for sample in out.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }

    fn retire_finished(&mut self) {
        let mut i = 0;
        while i < self.voices.len() {
            if !self.voices[i].is_done() {
                i += 1;
                continue;
            }
            self.voices[i].state.active.store(false, Ordering::Release);
            // Full until the next `send` drains it. Hold the buffer rather
            // than freeing it on this thread.
            if self.retired.is_full() {
                i += 1;
                continue;
            }
            let voice = self.voices.swap_remove(i);
            if let Err(PushError::Full(voice)) = self.retired.push(voice) {
                self.voices.push(voice);
            }
        }
    }
}
