use log::trace;
use melograph_ports::synth::{SynthError, SynthPort, ToneBuffer, ToneRequest};
use std::f64::consts::TAU;

/// Share of the buffer used for each of the fade-in and fade-out ramps.
pub const FADE_FRACTION: f64 = 0.1;

/// Renders `sin(2π·f·t) · volume` as mono `f32` PCM with linear anti-click
/// ramps over the first and last 10% of samples.
///
/// The buffer holds `round(duration · sample_rate)` samples. For very short
/// buffers the ramp length is clamped to half the buffer so the two ramps
/// never overlap.
pub fn render_tone(frequency: f64, duration: f64, volume: f32, sample_rate_hz: u32) -> Vec<f32> {
    let total = (duration * sample_rate_hz as f64).round().max(0.0) as usize;
    let fade_len = fade_length(total);
    let volume = volume.clamp(0.0, 1.0);
    let step = TAU * frequency / sample_rate_hz as f64;

    (0..total)
        .map(|i| {
            let sample = (step * i as f64).sin() as f32;
            sample * volume * envelope_gain(i, total, fade_len)
        })
        .collect()
}

/// Ramp length in samples for a buffer of `total` samples.
pub fn fade_length(total: usize) -> usize {
    let fade = (total as f64 * FADE_FRACTION) as usize;
    fade.min(total / 2)
}

/// Envelope at sample `index`: rises linearly from 0 over the first
/// `fade_len` samples and falls linearly to 0 over the last `fade_len`.
pub fn envelope_gain(index: usize, total: usize, fade_len: usize) -> f32 {
    if index >= total {
        return 0.0;
    }
    if fade_len == 0 {
        return 1.0;
    }
    let from_end = total - 1 - index;
    if index < fade_len {
        index as f32 / fade_len as f32
    } else if from_end < fade_len {
        from_end as f32 / fade_len as f32
    } else {
        1.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleSynth;

impl SimpleSynth {
    fn check(&self, request: &ToneRequest) -> Result<(), SynthError> {
        if !request.frequency.is_finite() || request.frequency <= 0.0 {
            return Err(SynthError::InvalidRequest(format!(
                "frequency {}",
                request.frequency
            )));
        }
        if !request.duration.is_finite() || request.duration <= 0.0 {
            return Err(SynthError::InvalidRequest(format!(
                "duration {}",
                request.duration
            )));
        }
        if request.sample_rate_hz == 0 {
            return Err(SynthError::InvalidRequest("sample rate 0".to_string()));
        }
        Ok(())
    }
}

impl SynthPort for SimpleSynth {
    fn render_tone(&self, request: &ToneRequest) -> Result<ToneBuffer, SynthError> {
        self.check(request)?;
        let samples = render_tone(
            request.frequency,
            request.duration,
            request.volume.get(),
            request.sample_rate_hz,
        );
        trace!(
            "rendered {:.2} Hz for {:.3} s: {} samples",
            request.frequency,
            request.duration,
            samples.len()
        );
        Ok(ToneBuffer {
            sample_rate_hz: request.sample_rate_hz,
            samples,
        })
    }
}
