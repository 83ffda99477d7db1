//! WAV file recorder
//!
//! Records synth output to 32-bit float WAV files, mono or stereo.

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::Engine;
use crate::synth::{Frame, SynthEvent, MAX_BLOCK_SIZE};

/// An event applied when rendering reaches `frame`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub frame: u64,
    pub event: SynthEvent,
}

impl ScheduledEvent {
    pub fn new(frame: u64, event: SynthEvent) -> Self {
        Self { frame, event }
    }
}

/// Schedule `notes` one after another, each held for `hold` frames.
/// With `chord` set, all notes start together instead.
pub fn note_sequence(notes: &[u8], velocity: u8, hold: u64, chord: bool) -> Vec<ScheduledEvent> {
    let mut events = Vec::with_capacity(notes.len() * 2);
    for (i, &note) in notes.iter().enumerate() {
        let start = if chord { 0 } else { i as u64 * hold };
        events.push(ScheduledEvent::new(start, SynthEvent::NoteOn { note, velocity }));
        events.push(ScheduledEvent::new(start + hold, SynthEvent::NoteOff { note }));
    }
    events.sort_by_key(|e| e.frame);
    events
}

/// WAV file recorder
pub struct Recorder {
    writer: WavWriter<BufWriter<File>>,
    sample_rate: u32,
    channels: u16,
    frames_written: u64,
}

impl Recorder {
    /// Create a new recorder
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `sample_rate` - Sample rate in Hz
    /// * `channels` - 1 (mid of left and right) or 2
    pub fn new(path: &Path, sample_rate: u32, channels: u16) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            bail!("Recorder supports 1 or 2 channels, got {}", channels);
        }
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer,
            sample_rate,
            channels,
            frames_written: 0,
        })
    }

    /// Get the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get the number of frames written
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Get the duration recorded in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames_written as f64 / self.sample_rate as f64
    }

    /// Write a block of stereo frames
    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        for &[left, right] in frames {
            if self.channels == 1 {
                self.write((0.5 * (left + right)) as f32)?;
            } else {
                self.write(left as f32)?;
                self.write(right as f32)?;
            }
        }
        self.frames_written += frames.len() as u64;
        Ok(())
    }

    /// Render `frames` frames from the engine into the file
    pub fn record(&mut self, engine: &mut Engine, frames: usize) -> Result<()> {
        let mut block = vec![[0.0; 2]; MAX_BLOCK_SIZE.min(frames.max(1))];
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(block.len());
            engine.fill_frames(&mut block[..n]);
            self.write_frames(&block[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    /// Render `frames` frames, applying each event at its frame.
    ///
    /// Events must be sorted by frame; events past the end are not applied.
    pub fn record_events(
        &mut self,
        engine: &mut Engine,
        events: &[ScheduledEvent],
        frames: u64,
    ) -> Result<()> {
        let mut position = 0u64;
        let mut pending = events.iter().peekable();

        while position < frames {
            while let Some(scheduled) = pending.next_if(|e| e.frame <= position) {
                engine.synth().handle(scheduled.event);
            }
            let next = pending.peek().map_or(frames, |e| e.frame.min(frames));
            self.record(engine, (next - position) as usize)?;
            position = next;
        }
        Ok(())
    }

    fn write(&mut self, sample: f32) -> Result<()> {
        self.writer
            .write_sample(sample)
            .context("failed to write sample")
    }

    /// Finalize the WAV file
    ///
    /// This must be called to properly close the file and write the header.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize().context("failed to finalize WAV file")
    }
}
