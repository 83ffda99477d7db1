//! Butterworth filters for analysing sampled signals
//!
//! A [`Filter`] is a cascade of biquad sections whose state survives between
//! calls, so filtering a signal block by block gives the same result as
//! filtering the whole signal at once (until [`Filter::reset`]).

use std::f64::consts::PI;

use crate::error::{Result, SynthError};

/// Default lower band edge in Hz
pub const DEFAULT_LOW: f64 = 50.0;
/// Default upper band edge in Hz
pub const DEFAULT_HIGH: f64 = 1000.0;
/// Default Butterworth order
pub const DEFAULT_ORDER: usize = 6;
/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Normalised second-order section (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // Filter state (Direct Form II transposed)
    z1: f64,
    z2: f64,
}

impl Biquad {
    /// Section from raw coefficients, normalised by `a0`
    pub fn new(b: [f64; 3], a: [f64; 3]) -> Self {
        let a0 = a[0];
        Self {
            b0: b[0] / a0,
            b1: b[1] / a0,
            b2: b[2] / a0,
            a1: a[1] / a0,
            a2: a[2] / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Second-order low-pass with quality factor `q`
    fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_omega, alpha) = Self::omega(cutoff, q, sample_rate);
        Self::new(
            [(1.0 - cos_omega) / 2.0, 1.0 - cos_omega, (1.0 - cos_omega) / 2.0],
            [1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha],
        )
    }

    /// Second-order high-pass with quality factor `q`
    fn highpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_omega, alpha) = Self::omega(cutoff, q, sample_rate);
        Self::new(
            [(1.0 + cos_omega) / 2.0, -(1.0 + cos_omega), (1.0 + cos_omega) / 2.0],
            [1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha],
        )
    }

    /// First-order low-pass (bilinear transform of 1 / (1 + s))
    fn lowpass_first_order(cutoff: f64, sample_rate: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        Self::new([k, k, 0.0], [1.0 + k, k - 1.0, 0.0])
    }

    /// First-order high-pass (bilinear transform of s / (1 + s))
    fn highpass_first_order(cutoff: f64, sample_rate: f64) -> Self {
        let k = (PI * cutoff / sample_rate).tan();
        Self::new([1.0, -1.0, 0.0], [1.0 + k, k - 1.0, 0.0])
    }

    fn omega(cutoff: f64, q: f64, sample_rate: f64) -> (f64, f64) {
        let omega = 2.0 * PI * cutoff / sample_rate;
        (omega.cos(), omega.sin() / (2.0 * q))
    }

    /// Process a single sample through the section
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset section state (clear history)
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Cascade of biquad sections
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    sections: Vec<Biquad>,
}

impl Filter {
    pub fn new(sections: Vec<Biquad>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Append the sections of `other` after this filter's own
    pub fn then(mut self, other: Filter) -> Self {
        self.sections.extend(other.sections);
        self
    }

    /// Process a single sample through every section
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.sections.iter_mut().fold(input, |x, section| section.process(x))
    }

    /// Process a buffer of samples in place
    pub fn process_buffer(&mut self, buffer: &mut [f64]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Filter `input` into a new buffer
    pub fn apply(&mut self, input: &[f64]) -> Vec<f64> {
        input.iter().map(|&x| self.process(x)).collect()
    }

    /// Reset filter state (clear history)
    pub fn reset(&mut self) {
        self.sections.iter_mut().for_each(Biquad::reset);
    }
}

fn check_cutoff(cutoff: f64, sample_rate: f64) -> Result<()> {
    let nyquist = sample_rate / 2.0;
    if !(cutoff > 0.0 && cutoff < nyquist) {
        return Err(SynthError::InvalidCutoff { cutoff, nyquist });
    }
    Ok(())
}

/// Q of each second-order section of an order-`order` Butterworth filter
fn butterworth_q(order: usize) -> impl Iterator<Item = f64> {
    let n = order as f64;
    (0..order / 2).map(move |k| 1.0 / (2.0 * (PI * (2 * k + 1) as f64 / (2.0 * n)).sin()))
}

/// Butterworth low-pass of the given order
pub fn lowpass(cutoff: f64, order: usize, sample_rate: f64) -> Result<Filter> {
    if order == 0 {
        return Err(SynthError::InvalidOrder);
    }
    check_cutoff(cutoff, sample_rate)?;

    let mut sections: Vec<Biquad> = butterworth_q(order)
        .map(|q| Biquad::lowpass(cutoff, q, sample_rate))
        .collect();
    if order % 2 == 1 {
        sections.push(Biquad::lowpass_first_order(cutoff, sample_rate));
    }
    Ok(Filter::new(sections))
}

/// Butterworth high-pass of the given order
pub fn highpass(cutoff: f64, order: usize, sample_rate: f64) -> Result<Filter> {
    if order == 0 {
        return Err(SynthError::InvalidOrder);
    }
    check_cutoff(cutoff, sample_rate)?;

    let mut sections: Vec<Biquad> = butterworth_q(order)
        .map(|q| Biquad::highpass(cutoff, q, sample_rate))
        .collect();
    if order % 2 == 1 {
        sections.push(Biquad::highpass_first_order(cutoff, sample_rate));
    }
    Ok(Filter::new(sections))
}

/// Butterworth band-pass: high-pass at `low` followed by low-pass at `high`
pub fn bandpass(low: f64, high: f64, order: usize, sample_rate: f64) -> Result<Filter> {
    if !(low > 0.0 && low < high) {
        return Err(SynthError::InvalidBand { low, high });
    }
    Ok(highpass(low, order, sample_rate)?.then(lowpass(high, order, sample_rate)?))
}

/// Band-pass followed by a first-order low-pass at `low`, which integrates
/// the band and smooths zero crossings for period measurement
pub fn bandpass_and_integrate(
    low: f64,
    high: f64,
    order: usize,
    sample_rate: f64,
) -> Result<Filter> {
    Ok(bandpass(low, high, order, sample_rate)?.then(lowpass(low, 1, sample_rate)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn sine(freq: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / SR).sin())
            .collect()
    }

    /// Steady-state RMS gain for a sine at `freq`
    fn gain_at(mut filter: Filter, freq: f64) -> f64 {
        let input = sine(freq, 44100);
        let output = filter.apply(&input);
        let rms = |x: &[f64]| (x.iter().map(|s| s * s).sum::<f64>() / x.len() as f64).sqrt();
        rms(&output[22050..]) / rms(&input[22050..])
    }

    /// Logarithmic chirp from `f0` to `f1` over `len` samples
    fn chirp(f0: f64, f1: f64, len: usize) -> Vec<f64> {
        let duration = len as f64 / SR;
        let k = (f1 / f0).ln() / duration;
        (0..len)
            .map(|i| {
                let t = i as f64 / SR;
                (2.0 * PI * f0 * ((k * t).exp() - 1.0) / k).sin()
            })
            .collect()
    }

    #[test]
    fn test_butterworth_q_values() {
        let q2: Vec<f64> = butterworth_q(2).collect();
        assert!((q2[0] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);

        let q4: Vec<f64> = butterworth_q(4).collect();
        assert!((q4[0] - 1.306_563).abs() < 1e-6);
        assert!((q4[1] - 0.541_196).abs() < 1e-6);

        let q3: Vec<f64> = butterworth_q(3).collect();
        assert_eq!(q3.len(), 1);
        assert!((q3[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_section_counts() {
        assert_eq!(lowpass(1000.0, 6, SR).unwrap().sections().len(), 3);
        assert_eq!(lowpass(1000.0, 5, SR).unwrap().sections().len(), 3);
        assert_eq!(highpass(1000.0, 1, SR).unwrap().sections().len(), 1);
        let filter = bandpass_and_integrate(DEFAULT_LOW, DEFAULT_HIGH, DEFAULT_ORDER, SR).unwrap();
        assert_eq!(filter.sections().len(), 7);
    }

    #[test]
    fn test_invalid_designs_rejected() {
        assert_eq!(lowpass(1000.0, 0, SR).unwrap_err(), SynthError::InvalidOrder);
        assert!(matches!(
            lowpass(30000.0, 4, SR),
            Err(SynthError::InvalidCutoff { .. })
        ));
        assert!(highpass(0.0, 2, SR).is_err());
        assert!(highpass(f64::NAN, 2, SR).is_err());
        assert_eq!(
            bandpass(1000.0, 50.0, 4, SR).unwrap_err(),
            SynthError::InvalidBand { low: 1000.0, high: 50.0 }
        );
    }

    #[test]
    fn test_lowpass_minus_3db_at_cutoff() {
        for order in [1, 2, 3, 6] {
            let gain = gain_at(lowpass(1000.0, order, SR).unwrap(), 1000.0);
            assert!(
                (gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02,
                "order {} gain {}",
                order,
                gain
            );
        }
    }

    #[test]
    fn test_lowpass_passes_low_and_stops_high() {
        assert!(gain_at(lowpass(1000.0, 6, SR).unwrap(), 100.0) > 0.99);
        assert!(gain_at(lowpass(1000.0, 6, SR).unwrap(), 5000.0) < 0.001);
    }

    #[test]
    fn test_highpass_stops_low_and_passes_high() {
        assert!(gain_at(highpass(1000.0, 4, SR).unwrap(), 100.0) < 0.001);
        assert!(gain_at(highpass(1000.0, 4, SR).unwrap(), 8000.0) > 0.99);
    }

    #[test]
    fn test_bandpass_shape() {
        let band = || bandpass(DEFAULT_LOW, DEFAULT_HIGH, DEFAULT_ORDER, SR).unwrap();
        assert!(gain_at(band(), 220.0) > 0.95);
        assert!(gain_at(band(), 10.0) < 0.01);
        assert!(gain_at(band(), 8000.0) < 0.01);
    }

    #[test]
    fn test_blocks_equal_whole_signal() {
        let signal = chirp(20.0, 20000.0, 5 * 44100);
        let designs = [
            lowpass(1000.0, 6, SR).unwrap(),
            lowpass(250.0, 6, SR).unwrap(),
            bandpass(DEFAULT_LOW, DEFAULT_HIGH, DEFAULT_ORDER, SR).unwrap(),
            bandpass_and_integrate(DEFAULT_LOW, DEFAULT_HIGH, DEFAULT_ORDER, SR).unwrap(),
        ];

        for mut filter in designs {
            let whole = filter.apply(&signal);
            assert!(whole.iter().all(|s| s.is_finite()));

            filter.reset();
            let (a, b) = signal.split_at(2 * 44100);
            let mut split = filter.apply(a);
            split.extend(filter.apply(b));

            for (x, y) in whole.iter().zip(&split) {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_process_buffer_matches_apply() {
        let input = sine(3000.0, 1000);
        let mut a = lowpass(500.0, 4, SR).unwrap();
        let mut b = a.clone();

        let mut buffer = input.clone();
        a.process_buffer(&mut buffer);
        assert_eq!(buffer, b.apply(&input));
    }

    #[test]
    fn test_filter_reset() {
        let mut filter = lowpass(1000.0, 2, SR).unwrap();
        for _ in 0..100 {
            filter.process(1.0);
        }

        filter.reset();
        let output = filter.process(0.0);
        assert_eq!(output, 0.0);
    }
}
