//! Error types for the synthesis and analysis library

use thiserror::Error;

/// Errors raised while building synth variants or analysis filters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthError {
    /// Cutoff frequency outside the open interval (0, Nyquist)
    #[error("cutoff {cutoff} Hz must lie strictly between 0 and Nyquist ({nyquist} Hz)")]
    InvalidCutoff { cutoff: f64, nyquist: f64 },

    /// Band edges not ordered as 0 < low < high
    #[error("band edges must satisfy 0 < low < high, got {low}..{high} Hz")]
    InvalidBand { low: f64, high: f64 },

    /// Filter order of zero
    #[error("filter order must be at least 1")]
    InvalidOrder,

    /// Crowd with no sub-voices
    #[error("a crowd needs at least one sub-voice")]
    EmptyCrowd,

    /// Negative or non-finite detune width
    #[error("frequency spread must be finite and non-negative, got {0}")]
    InvalidSpread(f64),
}

/// Result alias for library operations
pub type Result<T> = std::result::Result<T, SynthError>;
