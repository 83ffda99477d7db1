//! Zero-crossing pitch detection
//!
//! The input is band-passed and smoothed, then the detector times the rising
//! zero crossings. Crossings are located between samples by linear
//! interpolation, and the period estimate is the mean of the last few
//! intervals.

use std::collections::VecDeque;

use super::filter::{self, Filter};
use crate::error::Result;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

/// Streaming period estimator
#[derive(Debug, Clone)]
pub struct PitchDetector {
    sample_rate: f64,
    filter: Filter,
    n_periods: usize,
    /// Last measured periods in samples, oldest first
    periods: VecDeque<f64>,
    samples_seen: u64,
    last_value: f64,
    last_crossing: Option<f64>,
    scratch: Vec<f64>,
}

impl PitchDetector {
    /// Average over the last `n_periods` periods (at least one)
    pub fn new(sample_rate: f64, filter: Filter, n_periods: usize) -> Self {
        let n_periods = n_periods.max(1);
        Self {
            sample_rate,
            filter,
            n_periods,
            periods: VecDeque::with_capacity(n_periods),
            samples_seen: 0,
            last_value: 0.0,
            last_crossing: None,
            scratch: Vec::new(),
        }
    }

    /// Detector for roughly 50-1000 Hz material averaging two periods
    pub fn with_default_filter(sample_rate: f64) -> Result<Self> {
        let filter = filter::bandpass_and_integrate(
            filter::DEFAULT_LOW,
            filter::DEFAULT_HIGH,
            filter::DEFAULT_ORDER,
            sample_rate,
        )?;
        Ok(Self::new(sample_rate, filter, 2))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Feed the next block of the signal
    pub fn analyze(&mut self, block: &[f64]) {
        if block.is_empty() {
            return;
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(block);
        self.filter.process_buffer(&mut self.scratch);

        let offset = self.samples_seen as f64;
        let mut previous = self.last_value;
        for i in 0..self.scratch.len() {
            let current = self.scratch[i];
            if previous <= 0.0 && current > 0.0 {
                // Root of the line through (i - 1, previous) and (i, current)
                let position = i as f64 - 1.0 - previous / (current - previous);
                self.record_crossing(offset + position);
            }
            previous = current;
        }

        self.last_value = previous;
        self.samples_seen += block.len() as u64;
    }

    fn record_crossing(&mut self, position: f64) {
        if let Some(last) = self.last_crossing {
            if self.periods.len() == self.n_periods {
                self.periods.pop_front();
            }
            self.periods.push_back(position - last);
        }
        self.last_crossing = Some(position);
    }

    /// Mean of the recent periods in samples
    pub fn estimated_period(&self) -> Option<f64> {
        if self.periods.is_empty() {
            return None;
        }
        Some(self.periods.iter().sum::<f64>() / self.periods.len() as f64)
    }

    /// Estimated fundamental in Hz
    pub fn estimated_frequency(&self) -> Option<f64> {
        self.estimated_period()
            .filter(|&period| period > 0.0)
            .map(|period| self.sample_rate / period)
    }

    /// Analyze a block and return the updated frequency estimate
    pub fn process(&mut self, block: &[f64]) -> Option<f64> {
        self.analyze(block);
        self.estimated_frequency()
    }

    /// Forget all history, including filter state
    pub fn reset(&mut self) {
        self.filter.reset();
        self.periods.clear();
        self.samples_seen = 0;
        self.last_value = 0.0;
        self.last_crossing = None;
    }
}

/// Closest MIDI note to `frequency` and the offset from it in cents
pub fn nearest_note(frequency: f64) -> Option<(u8, f64)> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    let exact = 69.0 + 12.0 * (frequency / 440.0).log2();
    let note = exact.round();
    if !(0.0..=127.0).contains(&note) {
        return None;
    }
    Some((note as u8, (exact - note) * 100.0))
}

/// Note name with octave, e.g. `A4` or `C#/Db3`
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(note % 12)], octave)
}
