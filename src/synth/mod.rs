//! Synthesis engine for generating audio
//!
//! Contains oscillators, envelopes, the note voices and the polyphonic
//! voice table that mixes them.

mod crowd;
mod envelope;
mod event;
mod note;
mod oscillator;
mod poly;
mod variant;
mod voice;

pub use crowd::{CrowdNote, CrowdSpread};
pub use envelope::{Envelope, EnvelopeGain, EnvelopePhase};
pub use event::{SynthEvent, CC_ALL_NOTES_OFF, CC_VOLUME};
pub use note::{ModDepth, Modulator, OneNoteSynth};
pub use oscillator::{Oscillator, WaveShape, Waveform};
pub use poly::{PolySynth, VoiceSlot, VoiceTable};
pub use variant::{
    freq_of_note, from_config, volume_of_velocity, CrowdSynth, FmSynth, SimpleSynth,
    SynthVariant,
};
pub use voice::{pan, Frame, Voice, MAX_BLOCK_SIZE};
