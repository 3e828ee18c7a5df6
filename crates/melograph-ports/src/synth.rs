use crate::types::{SampleRateHz, Volume01};

#[derive(thiserror::Error, Debug)]
pub enum SynthError {
    #[error("invalid tone request: {0}")]
    InvalidRequest(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneRequest {
    pub frequency: f64,
    pub duration: f64,
    pub volume: Volume01,
    pub sample_rate_hz: SampleRateHz,
}

/// Mono PCM, `f32` samples in `[-1.0, 1.0]`. Output backends convert to
/// whatever integer format the device wants.
#[derive(Clone, Debug, PartialEq)]
pub struct ToneBuffer {
    pub sample_rate_hz: SampleRateHz,
    pub samples: Vec<f32>,
}

impl ToneBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

/// Stateless: the same request always renders the same buffer.
pub trait SynthPort: Send + Sync {
    fn render_tone(&self, request: &ToneRequest) -> Result<ToneBuffer, SynthError>;
}
