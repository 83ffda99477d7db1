//! Audio engine for crowdsynth
//!
//! Connects a shared [`PolySynth`] to the outside world: audio devices,
//! MIDI input, WAV files and the tuner.

pub mod midi;
pub mod player;
pub mod recorder;
pub mod tuner;

pub use midi::{list_midi_inputs, MidiListener};
pub use player::Player;
pub use recorder::{note_sequence, Recorder, ScheduledEvent};
pub use tuner::{InputAnalyzer, Tuner};

use cpal::{FromSample, Sample};
use std::sync::Arc;

use crate::synth::{Frame, PolySynth, MAX_BLOCK_SIZE};

/// Pulls blocks from the synth and lays them out for a device or file
pub struct Engine {
    synth: Arc<PolySynth>,
    frames: Vec<Frame>,
}

impl Engine {
    /// Create a new engine rendering `synth`
    pub fn new(synth: Arc<PolySynth>) -> Self {
        Self {
            synth,
            frames: vec![[0.0; 2]; MAX_BLOCK_SIZE],
        }
    }

    /// The synth shared with the event side
    pub fn synth(&self) -> &Arc<PolySynth> {
        &self.synth
    }

    /// Get the sample rate
    pub fn sample_rate(&self) -> f64 {
        self.synth.sample_rate()
    }

    /// Overwrite `data` with interleaved frames of `channels` channels.
    ///
    /// Channel 0 is left, channel 1 is right and any further channel gets the
    /// mid signal. A single channel also gets the mid signal.
    pub fn fill_interleaved<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        data.fill(T::EQUILIBRIUM);
        if channels == 0 {
            return;
        }

        for chunk in data.chunks_mut(channels * MAX_BLOCK_SIZE) {
            let n = chunk.len() / channels;
            let frames = &mut self.frames[..n];
            self.synth.render(frames);

            for (out, frame) in chunk.chunks_exact_mut(channels).zip(frames.iter()) {
                write_frame(out, frame);
            }
        }
    }

    /// Overwrite `out` with the next stereo frames
    pub fn fill_frames(&mut self, out: &mut [Frame]) {
        self.synth.render(out);
    }
}

fn write_frame<T>(out: &mut [T], &[left, right]: &Frame)
where
    T: Sample + FromSample<f32>,
{
    let mid = T::from_sample((0.5 * (left + right)) as f32);
    match out {
        [only] => *only = mid,
        [l, r, rest @ ..] => {
            *l = T::from_sample(left as f32);
            *r = T::from_sample(right as f32);
            rest.fill(mid);
        }
        [] => {}
    }
}
