//! Polyphonic voice table
//!
//! [`VoiceTable`] keeps the notes that are sounding (`active`, oldest first)
//! and the voices playing their release tails (`dying`). [`PolySynth`] wraps
//! it for use from two threads at once: an event thread applying note and
//! controller events, and the audio thread pulling blocks.
//!
//! Locking:
//! - the table lock is held only for structural changes and for cloning the
//!   list of voices to render, never while samples are computed;
//! - events never touch a voice directly. A release is recorded on the slot
//!   and a depth change is staged, both under the table lock, and the audio
//!   thread picks them up when it takes its snapshot. A render pass therefore
//!   sees every event either completely or not at all;
//! - each voice has its own lock, taken only by the audio thread;
//! - the variant lock serialises event handling so events apply in arrival
//!   order. The audio thread never takes it.
//!
//! Finished voices are only handed back by `reap` once no render snapshot
//! holds them, so the audio thread never frees a voice.
//!
//! Stealing is strictly FIFO by note-on order: when the table is full the
//! oldest note is released, whatever its pitch or loudness. This keeps the
//! note-on path short and predictable rather than choosing the least audible
//! voice.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::event::{SynthEvent, CC_ALL_NOTES_OFF};
use super::note::ModDepth;
use super::variant::{self, SynthVariant};
use super::voice::{Frame, Voice, MAX_BLOCK_SIZE};
use crate::config::SynthConfig;
use crate::error::Result;

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
/// Voice state stays structurally valid across a panic mid-render.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A voice shared between the table and the audio thread
pub struct VoiceSlot {
    voice: Mutex<Box<dyn Voice>>,
    alive: AtomicBool,
    release_pending: AtomicBool,
}

impl VoiceSlot {
    fn new(voice: Box<dyn Voice>) -> Self {
        let alive = voice.is_alive();
        Self {
            voice: Mutex::new(voice),
            alive: AtomicBool::new(alive),
            release_pending: AtomicBool::new(false),
        }
    }

    /// Liveness as of the last render
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Ask for a note-off, delivered at the start of the next render
    fn request_release(&self) {
        self.release_pending.store(true, Ordering::Release);
    }

    fn take_release(&self) -> bool {
        self.release_pending.swap(false, Ordering::AcqRel)
    }

    fn render(&self, out: &mut [Frame], release: bool) {
        let mut voice = lock(&self.voice);
        if release {
            voice.note_off();
        }
        for chunk in out.chunks_mut(MAX_BLOCK_SIZE) {
            if !voice.is_alive() {
                break;
            }
            voice.render(chunk);
        }
        self.alive.store(voice.is_alive(), Ordering::Release);
    }
}

/// Active and releasing voices. Not synchronised on its own; see [`PolySynth`].
pub struct VoiceTable {
    /// Sounding notes in note-on order, oldest at the front.
    /// Linear lookup: the table never holds more than `max_polyphony` notes.
    active: VecDeque<(u8, Arc<VoiceSlot>)>,
    dying: Vec<Arc<VoiceSlot>>,
    max_polyphony: usize,
}

impl VoiceTable {
    /// `max_polyphony` is raised to 1 if given as 0
    pub fn new(max_polyphony: usize) -> Self {
        let max_polyphony = max_polyphony.max(1);
        Self {
            active: VecDeque::with_capacity(max_polyphony),
            dying: Vec::with_capacity(max_polyphony),
            max_polyphony,
        }
    }

    pub fn max_polyphony(&self) -> usize {
        self.max_polyphony
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn dying_len(&self) -> usize {
        self.dying.len()
    }

    /// Sounding notes, oldest first
    pub fn active_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.active.iter().map(|(note, _)| *note)
    }

    pub fn contains(&self, note: u8) -> bool {
        self.active.iter().any(|(n, _)| *n == note)
    }

    /// Start `voice` for `note`. Returns the note stolen to make room, if any.
    pub fn note_on(&mut self, note: u8, voice: Box<dyn Voice>) -> Option<u8> {
        // A note never plays twice
        self.note_off(note);

        let stolen = if self.active.len() >= self.max_polyphony {
            let oldest = self.active.front().map(|(n, _)| *n);
            if let Some(oldest) = oldest {
                self.note_off(oldest);
            }
            oldest
        } else {
            None
        };

        self.active.push_back((note, Arc::new(VoiceSlot::new(voice))));
        stolen
    }

    /// Release `note` and move it to the dying list.
    /// Returns false if the note was not sounding, which is not an error.
    pub fn note_off(&mut self, note: u8) -> bool {
        let Some(index) = self.active.iter().position(|(n, _)| *n == note) else {
            return false;
        };
        if let Some((_, slot)) = self.active.remove(index) {
            slot.request_release();
            self.dying.push(slot);
        }
        true
    }

    /// Release every sounding note
    pub fn all_notes_off(&mut self) {
        while let Some((_, slot)) = self.active.pop_front() {
            slot.request_release();
            self.dying.push(slot);
        }
    }

    /// Remove the dying voices that have gone silent and hand them back, so
    /// the caller can drop them outside any lock.
    ///
    /// A silent voice still held by a render snapshot stays until a later
    /// call. Snapshots are only taken under the table lock, so a count of one
    /// cannot grow again.
    pub fn reap(&mut self) -> Vec<Arc<VoiceSlot>> {
        let mut dead = Vec::new();
        let mut i = 0;
        while i < self.dying.len() {
            let slot = &self.dying[i];
            if slot.is_alive() || Arc::strong_count(slot) > 1 {
                i += 1;
            } else {
                dead.push(self.dying.swap_remove(i));
            }
        }
        dead
    }

    /// Copy handles to every voice that needs rendering into `out`, each with
    /// the release requested since the previous snapshot
    fn snapshot(&self, out: &mut Vec<(Arc<VoiceSlot>, bool)>) {
        let slots = self.active.iter().map(|(_, slot)| slot).chain(&self.dying);
        out.extend(slots.map(|slot| (Arc::clone(slot), slot.take_release())));
    }
}

/// Scratch owned by the audio thread between calls
struct RenderScratch {
    voices: Vec<(Arc<VoiceSlot>, bool)>,
    frames: Vec<Frame>,
}

/// Thread-safe polyphonic synth: voice table, variant and output gain
pub struct PolySynth {
    table: Mutex<VoiceTable>,
    variant: Mutex<Box<dyn SynthVariant>>,
    scratch: Mutex<RenderScratch>,
    mod_depth: Option<ModDepth>,
    variant_name: &'static str,
    output_gain: f64,
    sample_rate: f64,
}

impl PolySynth {
    pub fn new(
        variant: Box<dyn SynthVariant>,
        max_polyphony: usize,
        output_gain: f64,
        sample_rate: f64,
    ) -> Self {
        let table = VoiceTable::new(max_polyphony);
        let reserve = table.max_polyphony() * 2;
        Self {
            variant_name: variant.name(),
            mod_depth: variant.mod_depth(),
            table: Mutex::new(table),
            variant: Mutex::new(variant),
            scratch: Mutex::new(RenderScratch {
                voices: Vec::with_capacity(reserve),
                frames: Vec::with_capacity(MAX_BLOCK_SIZE),
            }),
            output_gain,
            sample_rate,
        }
    }

    /// Build the synth described by a configuration
    pub fn from_config(config: &SynthConfig) -> Result<Self> {
        let sample_rate = f64::from(config.audio.sample_rate);
        let variant = variant::from_config(&config.synth, sample_rate)?;
        Ok(Self::new(
            variant,
            config.synth.max_polyphony,
            config.synth.output_gain,
            sample_rate,
        ))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn output_gain(&self) -> f64 {
        self.output_gain
    }

    pub fn variant_name(&self) -> &'static str {
        self.variant_name
    }

    pub fn max_polyphony(&self) -> usize {
        lock(&self.table).max_polyphony()
    }

    pub fn active_count(&self) -> usize {
        lock(&self.table).active_len()
    }

    pub fn dying_count(&self) -> usize {
        lock(&self.table).dying_len()
    }

    /// Sounding notes, oldest first
    pub fn active_notes(&self) -> Vec<u8> {
        lock(&self.table).active_notes().collect()
    }

    /// Apply one event
    pub fn handle(&self, event: SynthEvent) {
        match event {
            SynthEvent::NoteOn { note, velocity } => self.note_on(note, velocity),
            SynthEvent::NoteOff { note } => self.note_off(note),
            SynthEvent::ControlChange { controller, value } => {
                self.control_change(controller, value)
            }
        }
    }

    /// Trigger a note. Velocity 0 is a note-off.
    pub fn note_on(&self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(note);
            return;
        }

        let mut variant = lock(&self.variant);
        let voice = variant.create_note(note, velocity);

        let (stolen, dead) = {
            let mut table = lock(&self.table);
            let stolen = table.note_on(note, voice);
            (stolen, table.reap())
        };
        drop(variant);

        if let Some(stolen) = stolen {
            tracing::debug!(note, stolen, "voice stolen");
        }
        tracing::trace!(note, velocity, reaped = dead.len(), "note on");
    }

    /// Release a note; unknown notes are ignored
    pub fn note_off(&self, note: u8) {
        let _events = lock(&self.variant);
        let (released, dead) = {
            let mut table = lock(&self.table);
            let released = table.note_off(note);
            (released, table.reap())
        };
        tracing::trace!(note, released, reaped = dead.len(), "note off");
    }

    /// Release every sounding note
    pub fn all_notes_off(&self) {
        let _events = lock(&self.variant);
        let dead = {
            let mut table = lock(&self.table);
            table.all_notes_off();
            table.reap()
        };
        tracing::debug!(reaped = dead.len(), "all notes off");
    }

    /// Forward a controller to the variant; controller 123 releases all notes
    pub fn control_change(&self, controller: u8, value: u8) {
        if controller == CC_ALL_NOTES_OFF {
            self.all_notes_off();
            return;
        }
        let mut variant = lock(&self.variant);
        let _table = lock(&self.table);
        variant.control_change(controller, value);
    }

    /// Drop dying voices that have finished. Returns how many were removed.
    pub fn reap(&self) -> usize {
        let dead = lock(&self.table).reap();
        dead.len()
    }

    /// Overwrite `out` with the next block of stereo frames
    pub fn render(&self, out: &mut [Frame]) {
        let mut scratch = lock(&self.scratch);
        self.render_into(&mut scratch.voices, out);
    }

    /// Overwrite `out` with the next block, both channels averaged
    pub fn render_mono(&self, out: &mut [f64]) {
        let mut scratch = lock(&self.scratch);
        let RenderScratch { voices, frames } = &mut *scratch;

        for chunk in out.chunks_mut(MAX_BLOCK_SIZE) {
            frames.clear();
            frames.resize(chunk.len(), [0.0; 2]);
            self.render_into(voices, frames);
            for (sample, frame) in chunk.iter_mut().zip(frames.iter()) {
                *sample = 0.5 * (frame[0] + frame[1]);
            }
        }
    }

    fn render_into(&self, voices: &mut Vec<(Arc<VoiceSlot>, bool)>, out: &mut [Frame]) {
        out.fill([0.0; 2]);

        {
            let table = lock(&self.table);
            table.snapshot(voices);
            if let Some(depth) = &self.mod_depth {
                depth.publish();
            }
        }
        for (slot, release) in voices.iter() {
            slot.render(out, *release);
        }
        voices.clear();

        if self.output_gain != 1.0 {
            for frame in out.iter_mut() {
                frame[0] *= self.output_gain;
                frame[1] *= self.output_gain;
            }
        }
    }
}
