//! Voice trait for sound generators

/// One stereo frame: `[left, right]`
pub type Frame = [f64; 2];

/// Largest block a voice is asked to render in one call. Callers with larger
/// buffers split them into chunks of at most this many frames.
pub const MAX_BLOCK_SIZE: usize = 2048;

/// The capability set the voice table needs from anything it plays.
///
/// A voice is created on note-on, receives `note_off` once, keeps rendering
/// its release tail, and is dropped once `is_alive` turns false.
pub trait Voice: Send {
    /// Mix the next `out.len()` frames into `out` (adding, not overwriting).
    /// `out.len()` never exceeds [`MAX_BLOCK_SIZE`].
    fn render(&mut self, out: &mut [Frame]);

    /// Begin the release of the note
    fn note_off(&mut self);

    /// False once the voice can only produce silence
    fn is_alive(&self) -> bool;
}

/// Gains for a pan position in `[-1, 1]` (left to right).
///
/// Constant-sum law: the two gains always add up to 2, so the mid signal
/// `(left + right) / 2` does not depend on placement. The centre is unity
/// on both channels.
pub fn pan(position: f64) -> (f64, f64) {
    let p = if position.is_finite() { position.clamp(-1.0, 1.0) } else { 0.0 };
    (1.0 - p, 1.0 + p)
}
