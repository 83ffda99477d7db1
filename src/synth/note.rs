//! Single-note voice: oscillator scaled by an envelope, optionally frequency
//! modulated by one dedicated modulator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::envelope::{Envelope, EnvelopeGain, EnvelopePhase};
use super::oscillator::{Oscillator, Waveform};
use super::voice::{Frame, Voice, MAX_BLOCK_SIZE};

/// Modulation depth shared between a synth and every voice it created.
///
/// A new depth is staged with [`set`](Self::set) and reaches the voices on
/// [`publish`](Self::publish). The voice table publishes once per render
/// pass, so every voice in a pass sees the same depth.
#[derive(Debug, Clone, Default)]
pub struct ModDepth(Arc<DepthCell>);

#[derive(Debug, Default)]
struct DepthCell {
    staged: AtomicU64,
    current: AtomicU64,
}

impl ModDepth {
    /// A depth already visible to voices
    pub fn new(depth: f64) -> Self {
        let bits = depth.to_bits();
        Self(Arc::new(DepthCell {
            staged: AtomicU64::new(bits),
            current: AtomicU64::new(bits),
        }))
    }

    /// Depth the voices render with
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.current.load(Ordering::Acquire))
    }

    /// Depth waiting for the next publish
    pub fn pending(&self) -> f64 {
        f64::from_bits(self.0.staged.load(Ordering::Acquire))
    }

    pub fn set(&self, depth: f64) {
        self.0.staged.store(depth.to_bits(), Ordering::Release);
    }

    /// Make the staged depth the one voices render with
    pub fn publish(&self) {
        let bits = self.0.staged.load(Ordering::Acquire);
        self.0.current.store(bits, Ordering::Release);
    }
}

/// Oscillator, envelope and static volume
#[derive(Debug, Clone)]
struct Operator {
    osc: Oscillator,
    envelope: EnvelopeGain,
    volume: f64,
}

impl Operator {
    #[inline]
    fn next(&mut self, modulation: f64) -> f64 {
        self.osc.next_sample(modulation) * self.envelope.next_gain() * self.volume
    }
}

/// Sine modulator owned by exactly one carrier. It has no modulator of its
/// own, so FM chains are one level deep.
#[derive(Debug, Clone)]
pub struct Modulator {
    operator: Operator,
    depth: ModDepth,
    signal: Vec<f64>,
}

impl Modulator {
    pub fn new(frequency: f64, envelope: Envelope, depth: ModDepth, sample_rate: f64) -> Self {
        Self {
            operator: Operator {
                osc: Oscillator::new(Waveform::sine(), frequency, sample_rate),
                envelope: EnvelopeGain::new(envelope, sample_rate),
                volume: 1.0,
            },
            depth,
            signal: vec![0.0; MAX_BLOCK_SIZE],
        }
    }

    pub fn frequency(&self) -> f64 {
        self.operator.osc.frequency()
    }

    /// Render the next `frames` samples into the internal signal buffer
    fn render(&mut self, frames: usize) {
        for sample in &mut self.signal[..frames] {
            *sample = self.operator.next(0.0);
        }
    }
}

/// One sounding note
#[derive(Debug, Clone)]
pub struct OneNoteSynth {
    carrier: Operator,
    modulator: Option<Box<Modulator>>,
    alive: bool,
}

impl OneNoteSynth {
    pub fn new(
        frequency: f64,
        volume: f64,
        waveform: Waveform,
        envelope: Envelope,
        sample_rate: f64,
    ) -> Self {
        Self {
            carrier: Operator {
                osc: Oscillator::new(waveform, frequency, sample_rate),
                envelope: EnvelopeGain::new(envelope, sample_rate),
                volume,
            },
            modulator: None,
            alive: true,
        }
    }

    /// Attach the frequency modulator
    pub fn with_modulator(mut self, modulator: Modulator) -> Self {
        self.modulator = Some(Box::new(modulator));
        self
    }

    pub fn frequency(&self) -> f64 {
        self.carrier.osc.frequency()
    }

    pub fn volume(&self) -> f64 {
        self.carrier.volume
    }

    pub fn envelope_phase(&self) -> EnvelopePhase {
        self.carrier.envelope.phase()
    }

    /// Current modulation depth, if this note is frequency modulated
    pub fn modulation_depth(&self) -> Option<f64> {
        self.modulator.as_ref().map(|m| m.depth.get())
    }

    pub fn modulator(&self) -> Option<&Modulator> {
        self.modulator.as_deref()
    }

    /// Overwrite `out` with the next `out.len()` mono samples
    pub fn render_mono(&mut self, out: &mut [f64]) {
        out.fill(0.0);
        self.render_with(out.len(), |i, sample| out[i] = sample);
    }

    /// Mix the next `out.len()` samples into `out` with per-channel gains
    pub fn render_panned(&mut self, out: &mut [Frame], (left, right): (f64, f64)) {
        self.render_with(out.len(), |i, sample| {
            out[i][0] += sample * left;
            out[i][1] += sample * right;
        });
    }

    fn render_with(&mut self, frames: usize, mut emit: impl FnMut(usize, f64)) {
        if !self.alive {
            return;
        }

        let mut start = 0;
        while start < frames {
            let n = (frames - start).min(MAX_BLOCK_SIZE);
            match self.modulator.as_deref_mut() {
                Some(modulator) => {
                    // The modulator advances exactly once per block
                    modulator.render(n);
                    let depth = modulator.depth.get();
                    for (i, &m) in modulator.signal[..n].iter().enumerate() {
                        emit(start + i, self.carrier.next(depth * m));
                    }
                }
                None => {
                    for i in 0..n {
                        emit(start + i, self.carrier.next(0.0));
                    }
                }
            }
            start += n;
        }

        self.alive = !self.carrier.envelope.is_finished();
    }
}

impl Voice for OneNoteSynth {
    fn render(&mut self, out: &mut [Frame]) {
        self.render_panned(out, (1.0, 1.0));
    }

    fn note_off(&mut self) {
        self.carrier.envelope.release();
        if let Some(modulator) = self.modulator.as_deref_mut() {
            modulator.operator.envelope.release();
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
