//! Live pitch detection from an audio input device

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc::{self, Receiver, SyncSender};

use crate::analysis::PitchDetector;

/// Pending estimates kept when the reader falls behind
const READING_QUEUE: usize = 64;

/// Turns interleaved device buffers into frequency estimates
pub struct InputAnalyzer {
    detector: PitchDetector,
    channels: usize,
    scratch: Vec<f64>,
}

impl InputAnalyzer {
    pub fn new(detector: PitchDetector, channels: usize) -> Self {
        Self {
            detector,
            channels: channels.max(1),
            scratch: Vec::new(),
        }
    }

    /// Analyze the first channel of `data` and return the current estimate
    pub fn push<T>(&mut self, data: &[T]) -> Option<f64>
    where
        T: Sample,
        f32: FromSample<T>,
    {
        self.scratch.clear();
        self.scratch.extend(
            data.iter()
                .step_by(self.channels)
                .map(|&s| f64::from(f32::from_sample(s))),
        );
        self.detector.process(&self.scratch)
    }
}

/// Running input stream delivering frequency estimates in Hz
pub struct Tuner {
    _stream: Stream,
    readings: Receiver<f64>,
    sample_rate: u32,
    device_name: String,
}

impl Tuner {
    /// Listen on the input device whose name contains `device`, or on the
    /// default input device
    pub fn start(device: Option<&str>) -> Result<Self> {
        let device = find_input_device(device)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let default = device
            .default_input_config()
            .context("Input device has no default configuration")?;
        let sample_format = default.sample_format();
        let config: StreamConfig = default.into();
        let sample_rate = config.sample_rate.0;

        let detector = PitchDetector::with_default_filter(f64::from(sample_rate))?;
        let analyzer = InputAnalyzer::new(detector, usize::from(config.channels));
        let (sender, readings) = mpsc::sync_channel(READING_QUEUE);

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, analyzer, sender)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, analyzer, sender)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, analyzer, sender)?,
            other => return Err(anyhow!("Unsupported sample format {:?}", other)),
        };
        stream.play()?;
        tracing::info!(device = %device_name, sample_rate, "tuner input started");

        Ok(Self {
            _stream: stream,
            readings,
            sample_rate,
            device_name,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Most recent estimate, discarding older queued ones
    pub fn latest(&self) -> Option<f64> {
        self.readings.try_iter().last()
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut analyzer: InputAnalyzer,
    sender: SyncSender<f64>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if let Some(frequency) = analyzer.push(data) {
                // A full queue drops the reading; the next block brings a fresh one
                let _ = sender.try_send(frequency);
            }
        },
        |err| {
            tracing::warn!(error = %err, "audio input error");
        },
        None,
    )?;
    Ok(stream)
}

fn find_input_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available")),
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device '{}' not found", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_analyzer_reads_first_channel() {
        let detector = PitchDetector::with_default_filter(44100.0).unwrap();
        let mut analyzer = InputAnalyzer::new(detector, 2);

        let mut estimate = None;
        for block in 0..200 {
            let data: Vec<f32> = (0..256)
                .flat_map(|i| {
                    let t = (block * 256 + i) as f32 / 44100.0;
                    // Right channel carries a different pitch
                    [(2.0 * PI * 196.0 * t).sin(), (2.0 * PI * 523.0 * t).sin()]
                })
                .collect();
            estimate = analyzer.push(&data);
        }

        let estimate = estimate.unwrap();
        assert!((estimate - 196.0).abs() < 2.0, "got {}", estimate);
    }

    #[test]
    fn test_analyzer_accepts_integer_samples() {
        let detector = PitchDetector::with_default_filter(44100.0).unwrap();
        let mut analyzer = InputAnalyzer::new(detector, 1);

        let data = vec![0i16; 1024];
        assert_eq!(analyzer.push(&data), None);
    }
}
