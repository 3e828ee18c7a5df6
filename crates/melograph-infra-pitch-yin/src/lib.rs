pub mod yin;

use log::{debug, info};
use melograph_ports::notes::PitchFrame;
use melograph_ports::pitch::{PitchError, PitchFrames, PitchTrackerPort};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::path::Path;
use std::sync::Arc;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrackerConfigError {
    #[error("frame_size must be a power of two >= 64: {0}")]
    FrameSize(usize),
    #[error("hop_size must be in 1..=frame_size: {0}")]
    HopSize(usize),
    #[error("frequency range must satisfy 0 < min < max: {min}..{max}")]
    FrequencyRange { min: f32, max: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Search range for the fundamental, in Hz.
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// YIN absolute threshold on the normalized difference.
    pub threshold: f32,
    /// Frames quieter than this RMS are reported unvoiced.
    pub min_rms: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            min_frequency: 60.0,
            max_frequency: 2_200.0,
            threshold: 0.1,
            min_rms: 1e-3,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackerConfigError> {
        if self.frame_size < 64 || !self.frame_size.is_power_of_two() {
            return Err(TrackerConfigError::FrameSize(self.frame_size));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(TrackerConfigError::HopSize(self.hop_size));
        }
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency) {
            return Err(TrackerConfigError::FrequencyRange {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        Ok(())
    }
}

/// Decoded mono audio.
#[derive(Clone, Debug)]
pub struct MonoAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl MonoAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Reads a WAV file, scales integer PCM to `[-1, 1]` and averages channels.
pub fn read_wav(path: &Path) -> Result<MonoAudio, PitchError> {
    if !path.exists() {
        return Err(PitchError::NotFound(path.display().to_string()));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(PitchError::UnsupportedFormat(format!(
            "{} (supported: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let reader = hound::WavReader::open(path).map_err(|e| PitchError::Decode(e.to_string()))?;
    let format = reader.spec();
    let channels = format.channels.max(1) as usize;

    let interleaved: Vec<f32> = match format.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| PitchError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (format.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| PitchError::Decode(e.to_string()))?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(MonoAudio {
        sample_rate: format.sample_rate,
        samples,
    })
}

pub struct YinPitchTracker {
    config: TrackerConfig,
}

impl YinPitchTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Frame iterator over already-decoded audio.
    pub fn frames(&self, audio: MonoAudio) -> FrameIter {
        FrameIter::new(audio, self.config)
    }
}

impl PitchTrackerPort for YinPitchTracker {
    fn track(&self, path: &Path) -> Result<PitchFrames, PitchError> {
        let audio = read_wav(path)?;
        if audio.sample_rate == 0 {
            return Err(PitchError::Decode("sample rate 0".to_string()));
        }
        info!(
            "decoded {}: {:.2} s at {} Hz",
            path.display(),
            audio.duration_secs(),
            audio.sample_rate
        );
        Ok(Box::new(self.frames(audio)))
    }
}

/// Lazily analyses one hop at a time. Frames start every `hop_size`
/// samples; the tail is zero-padded so the last frame covers the end of the
/// signal.
pub struct FrameIter {
    audio: MonoAudio,
    config: TrackerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    index: usize,
    count: usize,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    yin_scratch: Vec<f32>,
}

impl FrameIter {
    fn new(audio: MonoAudio, config: TrackerConfig) -> Self {
        let n = config.frame_size;
        let count = audio.samples.len().div_ceil(config.hop_size);
        let fft = FftPlanner::new().plan_fft_forward(n);
        debug!("{count} frames of {n} samples, hop {}", config.hop_size);
        Self {
            audio,
            config,
            fft,
            window: hann_window(n),
            index: 0,
            count,
            frame: vec![0.0; n],
            spectrum: vec![Complex::new(0.0, 0.0); n],
            yin_scratch: Vec::with_capacity(n / 2),
        }
    }

    fn load_frame(&mut self, start: usize) {
        let available = self.audio.samples.len().saturating_sub(start);
        let n = available.min(self.frame.len());
        self.frame[..n].copy_from_slice(&self.audio.samples[start..start + n]);
        self.frame[n..].fill(0.0);
    }

    /// Magnitude of the windowed spectrum at the bin nearest `frequency`,
    /// or the spectral peak when no frequency is known.
    fn magnitude(&mut self, frequency: Option<f32>) -> f32 {
        for ((bin, &sample), &w) in self.spectrum.iter_mut().zip(&self.frame).zip(&self.window) {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.spectrum);

        let half = self.spectrum.len() / 2;
        let magnitudes = self.spectrum[..=half].iter().map(|c| c.norm());
        match frequency {
            Some(f) => {
                let bin = (f * self.config.frame_size as f32 / self.audio.sample_rate as f32)
                    .round() as usize;
                let lo = bin.saturating_sub(1);
                let hi = (bin + 1).min(half);
                magnitudes
                    .skip(lo)
                    .take(hi.saturating_sub(lo) + 1)
                    .fold(0.0, f32::max)
            }
            None => magnitudes.fold(0.0, f32::max),
        }
    }
}

impl Iterator for FrameIter {
    type Item = PitchFrame;

    fn next(&mut self) -> Option<PitchFrame> {
        if self.index >= self.count {
            return None;
        }
        let start = self.index * self.config.hop_size;
        self.index += 1;

        self.load_frame(start);
        let frequency = yin::detect_pitch(
            &self.frame,
            self.audio.sample_rate,
            &self.config,
            &mut self.yin_scratch,
        );
        let magnitude = self.magnitude(frequency);
        let time = start as f64 / self.audio.sample_rate as f64;

        Some(PitchFrame::new(
            time,
            frequency.map_or(0.0, f64::from),
            magnitude as f64,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count.saturating_sub(self.index);
        (left, Some(left))
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}
