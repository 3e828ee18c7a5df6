use crate::scheduler::PlayerConfig;
use melograph_domain_notes::{SegmenterConfig, SegmenterConfigError};
use melograph_ports::storage::SettingsDto;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("segmenter: {0}")]
    Segmenter(#[from] SegmenterConfigError),
    #[error("{0} must be > 0")]
    ZeroInterval(&'static str),
    #[error("sample rate must be > 0")]
    SampleRate,
    #[error("volume must be within 0..=1: {0}")]
    Volume(f32),
}

pub fn segmenter_config(settings: &SettingsDto) -> Result<SegmenterConfig, ConfigError> {
    let config = SegmenterConfig {
        window_size: settings.window_size,
        min_note_length: settings.min_note_length_secs,
        min_magnitude: settings.min_magnitude,
        pitch_tolerance_semitones: settings.pitch_tolerance_semitones,
        min_pitch: settings.min_pitch,
        max_pitch: settings.max_pitch,
    };
    config.validate()?;
    Ok(config)
}

pub fn player_config(settings: &SettingsDto) -> Result<PlayerConfig, ConfigError> {
    if settings.sample_rate_hz == 0 {
        return Err(ConfigError::SampleRate);
    }
    let volume = settings.volume.get();
    if !(0.0..=1.0).contains(&volume) {
        return Err(ConfigError::Volume(volume));
    }
    let config = PlayerConfig {
        volume: settings.volume,
        poll_interval: Duration::from_millis(settings.poll_interval_ms),
        drain_poll_interval: Duration::from_millis(settings.drain_poll_interval_ms),
        ..PlayerConfig::default()
    };
    config.validate()?;
    Ok(config)
}
