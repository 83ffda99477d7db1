//! crowdsynth - Polyphonic MIDI synthesizer with unison "crowd" voices
//!
//! Turns note and controller events into audio in real time. Each note is a
//! voice built by a synth variant (plain, frequency modulated, or a detuned
//! crowd of sub-voices); a bounded voice table mixes them block by block
//! while events arrive from another thread.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod synth;

pub use config::SynthConfig;
pub use engine::Engine;
pub use error::SynthError;
pub use synth::{PolySynth, SynthEvent};
