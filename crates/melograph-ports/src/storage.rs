use crate::notes::NoteList;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_window_size() -> usize {
    3
}

fn default_min_note_length_secs() -> f64 {
    0.25
}

fn default_min_magnitude() -> f64 {
    1.0
}

fn default_pitch_tolerance_semitones() -> f64 {
    0.5
}

fn default_min_pitch() -> u8 {
    36
}

fn default_max_pitch() -> u8 {
    96
}

fn default_volume() -> Volume01 {
    Volume01::new(0.5)
}

fn default_sample_rate_hz() -> SampleRateHz {
    44_100
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_drain_poll_interval_ms() -> u64 {
    100
}

fn default_analysis_frame_size() -> usize {
    2048
}

fn default_analysis_hop_size() -> usize {
    512
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_min_note_length_secs")]
    pub min_note_length_secs: f64,
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,
    #[serde(default = "default_pitch_tolerance_semitones")]
    pub pitch_tolerance_semitones: f64,
    #[serde(default = "default_min_pitch")]
    pub min_pitch: u8,
    #[serde(default = "default_max_pitch")]
    pub max_pitch: u8,
    #[serde(default = "default_volume")]
    pub volume: Volume01,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: SampleRateHz,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,
    pub selected_audio_out: Option<DeviceId>,
    #[serde(default = "default_analysis_frame_size")]
    pub analysis_frame_size: usize,
    #[serde(default = "default_analysis_hop_size")]
    pub analysis_hop_size: usize,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_note_length_secs: default_min_note_length_secs(),
            min_magnitude: default_min_magnitude(),
            pitch_tolerance_semitones: default_pitch_tolerance_semitones(),
            min_pitch: default_min_pitch(),
            max_pitch: default_max_pitch(),
            volume: default_volume(),
            sample_rate_hz: default_sample_rate_hz(),
            poll_interval_ms: default_poll_interval_ms(),
            drain_poll_interval_ms: default_drain_poll_interval_ms(),
            selected_audio_out: None,
            analysis_frame_size: default_analysis_frame_size(),
            analysis_hop_size: default_analysis_hop_size(),
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;

    /// Rejects invalid JSON, a missing `notes` key, and invalid entries,
    /// without returning a partial list.
    fn load_notes(&self, path: &Path) -> Result<NoteList, StorageError>;
    fn save_notes(&self, path: &Path, notes: &NoteList) -> Result<(), StorageError>;
}
