//! Phase-accumulating oscillator
//!
//! Waveforms are plain functions from a phase in `[0, 1)` to a sample in
//! `[-1, 1]`. They are naive (not band-limited).

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

/// Named waveform shapes, as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaveShape {
    #[default]
    Sine,
    Triangle,
    Saw,
    Square,
    /// Triangle whose peak is moved to the `skew` phase
    OffsetTriangle,
}

/// A periodic waveform: a pure function of phase, cheap to clone and share
#[derive(Clone)]
pub struct Waveform {
    name: &'static str,
    shape: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
}

impl Waveform {
    /// Wrap an arbitrary phase function
    pub fn new(name: &'static str, shape: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            name,
            shape: Arc::new(shape),
        }
    }

    /// Build from a configured shape; `skew` only affects `OffsetTriangle`
    pub fn from_shape(shape: WaveShape, skew: f64) -> Self {
        match shape {
            WaveShape::Sine => Self::sine(),
            WaveShape::Triangle => Self::triangle(),
            WaveShape::Saw => Self::saw(),
            WaveShape::Square => Self::square(),
            WaveShape::OffsetTriangle => Self::offset_triangle(skew),
        }
    }

    pub fn sine() -> Self {
        Self::new("sine", |phase| (phase * TAU).sin())
    }

    pub fn triangle() -> Self {
        Self::new("triangle", |p| {
            if p < 0.25 {
                4.0 * p
            } else if p < 0.75 {
                2.0 - 4.0 * p
            } else {
                4.0 * p - 4.0
            }
        })
    }

    pub fn saw() -> Self {
        Self::new("saw", |phase| 2.0 * phase - 1.0)
    }

    pub fn square() -> Self {
        Self::new("square", |phase| if phase < 0.5 { 1.0 } else { -1.0 })
    }

    /// Triangle rising from -1 to 1 over `[0, skew)` and falling back over
    /// `[skew, 1)`. A skew of 0 or 1 degenerates to a saw.
    pub fn offset_triangle(skew: f64) -> Self {
        let skew = if skew.is_finite() { skew.clamp(0.0, 1.0) } else { 0.5 };
        if skew <= 0.0 {
            return Self::new("offset_triangle", |p| 1.0 - 2.0 * p);
        }
        if skew >= 1.0 {
            return Self::new("offset_triangle", |p| 2.0 * p - 1.0);
        }
        Self::new("offset_triangle", move |p| {
            if p < skew {
                -1.0 + 2.0 * p / skew
            } else {
                1.0 - 2.0 * (p - skew) / (1.0 - skew)
            }
        })
    }

    /// Evaluate at a phase in `[0, 1)`
    #[inline]
    pub fn sample(&self, phase: f64) -> f64 {
        (self.shape)(phase)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Waveform").field(&self.name).finish()
    }
}

/// Oscillator with a phase accumulator that carries over between blocks
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    sample_rate: f64,
    phase: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Self {
            waveform,
            frequency,
            sample_rate,
            phase: 0.0,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Current phase, always in `[0, 1)`
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Produce one sample and advance the phase.
    ///
    /// `modulation` scales the instantaneous frequency to
    /// `frequency * (1 + modulation)`. Negative instantaneous frequencies run
    /// the phase backwards; the wrap keeps it in range.
    #[inline]
    pub fn next_sample(&mut self, modulation: f64) -> f64 {
        let sample = self.waveform.sample(self.phase);
        let step = self.frequency / self.sample_rate;
        self.phase = wrap(self.phase + step * (1.0 + modulation));
        sample
    }

    /// Fill `out` with waveform samples.
    ///
    /// With `fm = Some((signal, depth))` sample `i` is modulated by
    /// `depth * signal[i]`.
    pub fn fill(&mut self, fm: Option<(&[f64], f64)>, out: &mut [f64]) {
        match fm {
            None => {
                for sample in out.iter_mut() {
                    *sample = self.next_sample(0.0);
                }
            }
            Some((signal, depth)) => {
                debug_assert!(signal.len() >= out.len());
                for (sample, &m) in out.iter_mut().zip(signal) {
                    *sample = self.next_sample(depth * m);
                }
            }
        }
    }
}

#[inline]
fn wrap(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 || !wrapped.is_finite() {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::sine(), 440.0, 44100.0);
        let mut out = [1.0; 1];
        osc.fill(None, &mut out);
        assert!(out[0].abs() < 1e-12);
    }

    #[test]
    fn test_square_oscillator() {
        let mut osc = Oscillator::new(Waveform::square(), 1.0, 4.0);
        let mut out = [0.0; 4];
        osc.fill(None, &mut out);
        assert_eq!(out, [1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_saw_oscillator() {
        let mut osc = Oscillator::new(Waveform::saw(), 1.0, 4.0);
        let mut out = [0.0; 4];
        osc.fill(None, &mut out);
        assert_eq!(out, [-1.0, -0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_offset_triangle_shape() {
        let wave = Waveform::offset_triangle(0.2);
        assert_eq!(wave.sample(0.0), -1.0);
        assert!((wave.sample(0.1) - 0.0).abs() < 1e-12);
        assert!((wave.sample(0.2) - 1.0).abs() < 1e-12);
        assert!((wave.sample(0.6) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_offset_triangle_degenerate_skew() {
        let rising = Waveform::offset_triangle(1.0);
        let falling = Waveform::offset_triangle(0.0);
        assert_eq!(rising.sample(0.5), 0.0);
        assert_eq!(falling.sample(0.25), 0.5);
        assert!(Waveform::offset_triangle(f64::NAN).sample(0.5).is_finite());
    }

    #[test]
    fn test_waveforms_stay_in_range() {
        for shape in [
            WaveShape::Sine,
            WaveShape::Triangle,
            WaveShape::Saw,
            WaveShape::Square,
            WaveShape::OffsetTriangle,
        ] {
            let wave = Waveform::from_shape(shape, 0.2);
            for i in 0..1000 {
                let s = wave.sample(i as f64 / 1000.0);
                assert!((-1.0..=1.0).contains(&s), "{:?} out of range: {}", shape, s);
            }
        }
    }

    #[test]
    fn test_phase_continues_across_blocks() {
        let mut whole = Oscillator::new(Waveform::sine(), 523.25, 44100.0);
        let mut split = Oscillator::new(Waveform::sine(), 523.25, 44100.0);

        let mut a = vec![0.0; 512];
        whole.fill(None, &mut a);

        let mut b = vec![0.0; 512];
        let (first, second) = b.split_at_mut(256);
        split.fill(None, first);
        split.fill(None, second);

        assert_eq!(a, b);
        assert_eq!(whole.phase(), split.phase());
    }

    #[test]
    fn test_negative_instantaneous_frequency_is_tolerated() {
        let mut osc = Oscillator::new(Waveform::saw(), 1000.0, 44100.0);
        let modulator = vec![-1.0; 256];
        let mut out = vec![0.0; 256];

        osc.fill(Some((&modulator, 3.0)), &mut out);

        assert!(out.iter().all(|s| s.is_finite() && (-1.0..=1.0).contains(s)));
        assert!((0.0..1.0).contains(&osc.phase()));
    }

    #[test]
    fn test_zero_modulation_matches_plain() {
        let mut plain = Oscillator::new(Waveform::triangle(), 300.0, 44100.0);
        let mut modulated = Oscillator::new(Waveform::triangle(), 300.0, 44100.0);
        let silence = vec![0.0; 128];

        let mut a = vec![0.0; 128];
        let mut b = vec![0.0; 128];
        plain.fill(None, &mut a);
        modulated.fill(Some((&silence, 5.0)), &mut b);

        assert_eq!(a, b);
    }

    #[test]
    fn test_wave_shape_from_yaml() {
        let shape: WaveShape = serde_yaml::from_str("offset_triangle").unwrap();
        assert_eq!(shape, WaveShape::OffsetTriangle);
    }
}
