use crate::synth::ToneBuffer;
use crate::types::*;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// One sounding note. Queries must not block.
pub trait PlaybackHandle: Send {
    fn is_active(&self) -> bool;
    /// Silences the voice early. Idempotent.
    fn stop(&self);
}

/// An open output stream. `play` is fire-and-forget: mixing concurrently
/// playing voices is the stream's job.
pub trait AudioStreamHandle: Send {
    fn sample_rate_hz(&self) -> SampleRateHz;
    fn play(&self, tone: ToneBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError>;
    fn close(self: Box<Self>);
}

pub trait AudioOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError>;

    /// `None` selects the host's default output device.
    fn open_output(
        &self,
        device_id: Option<&DeviceId>,
        config: AudioConfig,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError>;
}
