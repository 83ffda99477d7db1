//! Unison "crowd" voice
//!
//! One logical note played by many slightly detuned copies with random
//! volume weights and, optionally, random stereo placement. The cluster acts
//! as a single [`Voice`]: it is alive while any member is, and a note-off
//! releases every member.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::envelope::Envelope;
use super::note::OneNoteSynth;
use super::oscillator::Waveform;
use super::voice::{pan, Frame, Voice};
use crate::error::{Result, SynthError};

/// How a note is spread over its crowd
#[derive(Debug, Clone)]
pub struct CrowdSpread {
    voices: usize,
    detune: Normal<f64>,
    stereo: bool,
}

impl CrowdSpread {
    /// `freq_width` is the standard deviation of the relative detune
    /// (0.01 = one percent).
    pub fn new(voices: usize, freq_width: f64, stereo: bool) -> Result<Self> {
        if voices == 0 {
            return Err(SynthError::EmptyCrowd);
        }
        if !freq_width.is_finite() || freq_width < 0.0 {
            return Err(SynthError::InvalidSpread(freq_width));
        }
        let detune =
            Normal::new(0.0, freq_width).map_err(|_| SynthError::InvalidSpread(freq_width))?;

        Ok(Self {
            voices,
            detune,
            stereo,
        })
    }

    pub fn voices(&self) -> usize {
        self.voices
    }

    pub fn freq_width(&self) -> f64 {
        self.detune.std_dev()
    }

    pub fn stereo(&self) -> bool {
        self.stereo
    }
}

#[derive(Debug, Clone)]
struct Member {
    synth: OneNoteSynth,
    pan: f64,
    gains: (f64, f64),
}

/// A cluster of detuned sub-voices behaving as one note
#[derive(Debug, Clone)]
pub struct CrowdNote {
    members: Vec<Member>,
    alive: bool,
}

impl CrowdNote {
    /// Build a crowd around `frequency` whose member volumes sum to `volume`
    pub fn new<R: Rng>(
        frequency: f64,
        volume: f64,
        waveform: &Waveform,
        envelope: Envelope,
        spread: &CrowdSpread,
        sample_rate: f64,
        rng: &mut R,
    ) -> Self {
        let mut weights: Vec<f64> = (0..spread.voices).map(|_| rng.random::<f64>()).collect();
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            weights.iter_mut().for_each(|w| *w /= total);
        } else {
            weights.fill(1.0 / spread.voices as f64);
        }

        let members = weights
            .into_iter()
            .map(|weight| {
                let detuned = frequency * (1.0 + spread.detune.sample(&mut *rng));
                // Drawn either way so a seed gives the same detune in mono and stereo
                let placed: f64 = rng.random_range(-1.0..=1.0);
                let position = if spread.stereo { placed } else { 0.0 };
                Member {
                    synth: OneNoteSynth::new(
                        detuned,
                        volume * weight,
                        waveform.clone(),
                        envelope,
                        sample_rate,
                    ),
                    pan: position,
                    gains: pan(position),
                }
            })
            .collect();

        Self {
            members,
            alive: true,
        }
    }

    /// Number of sub-voices
    pub fn voices(&self) -> usize {
        self.members.len()
    }

    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.members.iter().map(|m| m.synth.frequency())
    }

    pub fn volumes(&self) -> impl Iterator<Item = f64> + '_ {
        self.members.iter().map(|m| m.synth.volume())
    }

    pub fn pans(&self) -> impl Iterator<Item = f64> + '_ {
        self.members.iter().map(|m| m.pan)
    }
}

impl Voice for CrowdNote {
    fn render(&mut self, out: &mut [Frame]) {
        for member in self.members.iter_mut().filter(|m| m.synth.is_alive()) {
            member.synth.render_panned(out, member.gains);
        }
        self.alive = self.members.iter().any(|m| m.synth.is_alive());
    }

    fn note_off(&mut self) {
        for member in &mut self.members {
            member.synth.note_off();
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
