use crate::clock::{Clock, StopFlag};
use crate::config::ConfigError;
use crate::ipc::PlayerEvent;
use crate::scheduler::{PlaybackSummary, Player, PlayerConfig};
use crossbeam_channel::Receiver;
use log::info;
use melograph_ports::audio::{AudioError, AudioOutputPort, AudioStreamHandle};
use melograph_ports::notes::NoteList;
use melograph_ports::synth::SynthPort;
use melograph_ports::types::{AudioConfig, DeviceId, SampleRateHz};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("invalid player config: {0}")]
    Config(#[from] ConfigError),
    #[error("audio output: {0}")]
    Audio(#[from] AudioError),
}

/// A player bound to an open output stream. The stream is closed when the
/// run ends.
pub struct PlaybackSession {
    player: Player,
    output: Box<dyn AudioStreamHandle>,
}

impl PlaybackSession {
    pub fn open(
        notes: NoteList,
        config: PlayerConfig,
        synth: Arc<dyn SynthPort>,
        audio: &dyn AudioOutputPort,
        device: Option<&DeviceId>,
        sample_rate_hz: SampleRateHz,
    ) -> Result<Self, PlayerError> {
        let player = Player::new(notes, config, synth)?;
        let output = audio.open_output(device, AudioConfig::mono(sample_rate_hz))?;
        info!(
            "output {} at {} Hz",
            device.map_or_else(|| "default".to_string(), DeviceId::to_string),
            output.sample_rate_hz()
        );
        Ok(Self { player, output })
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.player.stop_flag()
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        self.player.subscribe()
    }

    pub fn run(mut self, clock: &dyn Clock) -> PlaybackSummary {
        let summary = self.player.run(self.output.as_ref(), clock);
        self.output.close();
        summary
    }
}
