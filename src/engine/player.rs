//! Real-time audio playback using cpal

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Engine;
use crate::synth::PolySynth;

/// Real-time audio player
pub struct Player {
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl Player {
    pub fn new() -> Self {
        Self {
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start playing `synth` on an output device.
    ///
    /// `device` selects an output device by name substring; `buffer_size` is
    /// a request the device may refuse, in which case its default is used.
    pub fn start(&mut self, synth: Arc<PolySynth>, device: Option<&str>, buffer_size: usize) -> Result<()> {
        let device = find_output_device(device)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let default = device
            .default_output_config()
            .context("Output device has no default configuration")?;
        let sample_format = default.sample_format();
        let mut stream_config = StreamConfig {
            channels: default.channels(),
            sample_rate: SampleRate(synth.sample_rate() as u32),
            buffer_size: BufferSize::Fixed(buffer_size as u32),
        };

        self.running.store(true, Ordering::SeqCst);

        let stream = match self.build_for_format(&device, &stream_config, sample_format, &synth) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, buffer_size, "fixed buffer size refused, using device default");
                stream_config.buffer_size = BufferSize::Default;
                self.build_for_format(&device, &stream_config, sample_format, &synth)?
            }
        };

        stream.play()?;
        tracing::info!(
            device = %name,
            channels = stream_config.channels,
            sample_rate = stream_config.sample_rate.0,
            ?sample_format,
            "audio output started"
        );
        self.stream = Some(stream);

        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn build_for_format(
        &self,
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        synth: &Arc<PolySynth>,
    ) -> Result<Stream> {
        let engine = Engine::new(Arc::clone(synth));
        match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(device, config, engine),
            SampleFormat::I16 => self.build_stream::<i16>(device, config, engine),
            SampleFormat::U16 => self.build_stream::<u16>(device, config, engine),
            other => Err(anyhow!("Unsupported sample format {:?}", other)),
        }
    }

    fn build_stream<T>(&self, device: &Device, config: &StreamConfig, mut engine: Engine) -> Result<Stream>
    where
        T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let running = Arc::clone(&self.running);

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    // Fill with silence when stopped
                    data.fill(T::EQUILIBRIUM);
                    return;
                }
                engine.fill_interleaved(data, channels);
            },
            |err| {
                tracing::warn!(error = %err, "audio stream error");
            },
            None,
        )?;

        Ok(stream)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

fn find_output_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available")),
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
            .ok_or_else(|| anyhow!("Output device '{}' not found", name)),
    }
}

/// Get the default output device name
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}

/// List all available output devices
pub fn list_output_devices() -> Vec<(String, StreamConfig)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_output_config()) {
                devices.push((name, config.into()));
            }
        }
    }

    devices
}

/// List all available input devices
pub fn list_input_devices() -> Vec<(String, StreamConfig)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_input_config()) {
                devices.push((name, config.into()));
            }
        }
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_starts_stopped() {
        let player = Player::default();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_stop_without_start() {
        let mut player = Player::new();
        player.stop();
        assert!(!player.is_playing());
    }
}
