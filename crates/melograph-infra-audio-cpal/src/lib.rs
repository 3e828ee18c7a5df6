pub mod mixer;

use crate::mixer::{voice_queue, Mixer, VoiceSender};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};
use melograph_ports::audio::{AudioError, AudioOutputPort, AudioStreamHandle, PlaybackHandle};
use melograph_ports::synth::ToneBuffer;
use melograph_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, SampleRateHz};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread;

pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

struct SelectedStreamConfig {
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let mut list = Vec::new();
        for (index, device) in devices.enumerate() {
            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown Output".to_string());
            let id = DeviceId(format!("cpal:{}:{}:{}", host_id, index, name));
            list.push((id, device));
        }

        Ok(list)
    }

    fn find_device(
        host: &cpal::Host,
        device_id: Option<&DeviceId>,
    ) -> Result<cpal::Device, AudioError> {
        match device_id {
            Some(wanted) => Self::list_devices_from_host(host)?
                .into_iter()
                .find(|(id, _)| id == wanted)
                .map(|(_, device)| device)
                .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string())),
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output".to_string())),
        }
    }

    fn select_stream_config(
        device: &cpal::Device,
        desired: AudioConfig,
    ) -> Result<SelectedStreamConfig, AudioError> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let chosen = match select_supported_config(&mut supported, desired) {
            Some(chosen) => chosen,
            None => {
                let fallback = device
                    .default_output_config()
                    .map_err(|e| AudioError::UnsupportedConfig(e.to_string()))?;
                warn!(
                    "{} Hz not supported, using device default {} Hz",
                    desired.sample_rate_hz,
                    fallback.sample_rate().0
                );
                fallback
            }
        };

        let sample_format = chosen.sample_format();
        let mut config = chosen.config();

        config.buffer_size = match desired.buffer_size_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };

        Ok(SelectedStreamConfig {
            config,
            sample_format,
        })
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

/// An open output. The cpal stream itself lives on a dedicated thread
/// because it is not `Send` on every host.
pub struct CpalAudioStreamHandle {
    sample_rate_hz: SampleRateHz,
    voices: Mutex<VoiceSender>,
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn sample_rate_hz(&self) -> SampleRateHz {
        self.sample_rate_hz
    }

    fn play(&self, tone: ToneBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        if tone.sample_rate_hz != self.sample_rate_hz {
            return Err(AudioError::UnsupportedConfig(format!(
                "tone rendered at {} Hz, stream runs at {} Hz",
                tone.sample_rate_hz, self.sample_rate_hz
            )));
        }
        let handle = self.voices.lock().send(tone.samples)?;
        Ok(Box::new(handle))
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        let mut results = Vec::new();

        for (id, device) in devices {
            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown Output".to_string());
            let default_config = match device.default_output_config() {
                Ok(config) => config,
                Err(err) => {
                    debug!("skipping output {name}: {err}");
                    continue;
                }
            };

            let config = AudioConfig {
                sample_rate_hz: default_config.sample_rate().0,
                channels: default_config.channels(),
                buffer_size_frames: None,
            };

            results.push(AudioOutputDevice {
                id,
                name,
                default_config: config,
            });
        }

        Ok(results)
    }

    fn open_output(
        &self,
        device_id: Option<&DeviceId>,
        config: AudioConfig,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.cloned();
        let desired = config;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel();
        let (sender, mixer) = voice_queue();

        let join_handle = thread::Builder::new()
            .name("melograph-audio-out".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let opened = Self::find_device(&host, device_id.as_ref()).and_then(|device| {
                    let stream_config = Self::select_stream_config(&device, desired)?;
                    let sample_rate_hz = stream_config.config.sample_rate.0;
                    let stream = build_stream(&device, stream_config, mixer)?;
                    stream
                        .play()
                        .map_err(|e| AudioError::Backend(e.to_string()))?;
                    Ok((stream, sample_rate_hz))
                });

                let stream = match opened {
                    Ok((stream, sample_rate_hz)) => {
                        let _ = ready_tx.send(Ok(sample_rate_hz));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let sample_rate_hz = ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;
        info!("audio output open at {sample_rate_hz} Hz");

        Ok(Box::new(CpalAudioStreamHandle {
            sample_rate_hz,
            voices: Mutex::new(sender),
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

fn build_stream(
    device: &cpal::Device,
    stream_config: SelectedStreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, AudioError> {
    let channels = stream_config.config.channels as usize;
    let initial_frames = match stream_config.config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => 8192,
    };
    let mut mono: Vec<f32> = vec![0.0; initial_frames];

    let error_callback = |err| {
        error!("cpal stream error: {err}");
    };

    let stream = match stream_config.sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config.config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                if frames > mono.len() {
                    mono.resize(frames, 0.0);
                }
                mixer.render(&mut mono[..frames]);
                write_interleaved_f32(data, channels, &mono[..frames]);
            },
            error_callback,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &stream_config.config,
            move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                if frames > mono.len() {
                    mono.resize(frames, 0.0);
                }
                mixer.render(&mut mono[..frames]);
                write_interleaved_i16(data, channels, &mono[..frames]);
            },
            error_callback,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &stream_config.config,
            move |data: &mut [u16], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                if frames > mono.len() {
                    mono.resize(frames, 0.0);
                }
                mixer.render(&mut mono[..frames]);
                write_interleaved_u16(data, channels, &mono[..frames]);
            },
            error_callback,
            None,
        ),
        _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
    };

    stream.map_err(|e| AudioError::Backend(e.to_string()))
}

/// Picks the best sample format among ranges that contain the requested
/// rate, preferring an exact channel match. Mono is duplicated to every
/// channel, so any channel count will do.
fn select_supported_config(
    supported: &mut dyn Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Option<cpal::SupportedStreamConfig> {
    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score: i32 = -1;

    for config_range in supported {
        if config_range.channels() == 0 {
            continue;
        }
        let min = config_range.min_sample_rate().0;
        let max = config_range.max_sample_rate().0;
        if desired.sample_rate_hz < min || desired.sample_rate_hz > max {
            continue;
        }

        let format_score = match config_range.sample_format() {
            SampleFormat::F32 => 3,
            SampleFormat::I16 => 2,
            SampleFormat::U16 => 1,
            _ => continue,
        };
        let channel_score = if config_range.channels() == desired.channels {
            10
        } else {
            0
        };
        let score = format_score + channel_score;

        if score > best_score {
            best = Some(config_range.with_sample_rate(SampleRate(desired.sample_rate_hz)));
            best_score = score;
        }
    }

    best
}

fn write_interleaved_f32(data: &mut [f32], channels: usize, mono: &[f32]) {
    for (frame, out) in data.chunks_mut(channels.max(1)).enumerate() {
        let value = mono.get(frame).copied().unwrap_or(0.0);
        out.fill(value);
    }
}

fn write_interleaved_i16(data: &mut [i16], channels: usize, mono: &[f32]) {
    for (frame, out) in data.chunks_mut(channels.max(1)).enumerate() {
        let value = f32_to_i16(mono.get(frame).copied().unwrap_or(0.0));
        out.fill(value);
    }
}

fn write_interleaved_u16(data: &mut [u16], channels: usize, mono: &[f32]) {
    for (frame, out) in data.chunks_mut(channels.max(1)).enumerate() {
        let value = f32_to_u16(mono.get(frame).copied().unwrap_or(0.0));
        out.fill(value);
    }
}

fn f32_to_i16(value: f32) -> i16 {
    let v = value.clamp(-1.0, 1.0);
    (v * i16::MAX as f32) as i16
}

fn f32_to_u16(value: f32) -> u16 {
    let v = value.clamp(-1.0, 1.0);
    let scaled = (v * 0.5 + 0.5) * u16::MAX as f32;
    scaled.round().clamp(0.0, u16::MAX as f32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_matching_channels_then_float() {
        let ranges = vec![
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::I16),
            range(1, 8_000, 22_050, SampleFormat::F32),
        ];

        let chosen = select_supported_config(&mut ranges.into_iter(), AudioConfig::mono(44_100))
            .expect("a range matches");

        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_format(), SampleFormat::I16);
        assert_eq!(chosen.sample_rate().0, 44_100);
    }

    #[test]
    fn falls_back_to_any_channel_count() {
        let ranges = vec![range(2, 44_100, 48_000, SampleFormat::F32)];

        let chosen = select_supported_config(&mut ranges.into_iter(), AudioConfig::mono(44_100))
            .expect("stereo accepted");

        assert_eq!(chosen.channels(), 2);
    }

    #[test]
    fn rejects_unsupported_rate() {
        let ranges = vec![range(1, 48_000, 48_000, SampleFormat::F32)];
        assert!(
            select_supported_config(&mut ranges.into_iter(), AudioConfig::mono(44_100)).is_none()
        );
    }

    #[test]
    fn mono_is_copied_to_every_channel() {
        let mut data = [0.0_f32; 6];
        write_interleaved_f32(&mut data, 2, &[0.1, 0.2, 0.3]);
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);

        let mut ints = [0_i16; 2];
        write_interleaved_i16(&mut ints, 1, &[1.0, -2.0]);
        assert_eq!(ints, [i16::MAX, -i16::MAX]);

        assert_eq!(f32_to_u16(0.0), 32_768);
    }
}
