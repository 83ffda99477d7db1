//! Signal analysis: Butterworth filters and pitch detection

pub mod filter;
pub mod pitch;

pub use filter::{Biquad, Filter};
pub use pitch::{nearest_note, note_name, PitchDetector};
