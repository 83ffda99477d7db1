//! Control events consumed by the synth

/// Controller number for channel volume, used as FM depth
pub const CC_VOLUME: u8 = 7;
/// Controller number for "all notes off"
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Note and controller events, channel-agnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthEvent {
    /// Note on: note (0-127), velocity (0-127)
    NoteOn { note: u8, velocity: u8 },
    /// Note off: note (0-127)
    NoteOff { note: u8 },
    /// Control change: controller (0-127), value (0-127)
    ControlChange { controller: u8, value: u8 },
}

impl SynthEvent {
    /// Decode a raw MIDI message on any channel.
    ///
    /// Returns `None` for messages the synth does not react to. A note-on
    /// with velocity 0 decodes as a note-off.
    pub fn from_midi(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        match (status & 0xF0, data) {
            (0x80, [note, _, ..]) => Some(SynthEvent::NoteOff { note: note & 0x7F }),
            (0x90, [note, 0, ..]) => Some(SynthEvent::NoteOff { note: note & 0x7F }),
            (0x90, [note, velocity, ..]) => Some(SynthEvent::NoteOn {
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            }),
            (0xB0, [controller, value, ..]) => Some(SynthEvent::ControlChange {
                controller: controller & 0x7F,
                value: value & 0x7F,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_note_on() {
        assert_eq!(
            SynthEvent::from_midi(&[0x90, 60, 100]),
            Some(SynthEvent::NoteOn { note: 60, velocity: 100 })
        );
    }

    #[test]
    fn test_decode_note_on_any_channel() {
        assert_eq!(
            SynthEvent::from_midi(&[0x95, 72, 80]),
            Some(SynthEvent::NoteOn { note: 72, velocity: 80 })
        );
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        assert_eq!(
            SynthEvent::from_midi(&[0x90, 60, 0]),
            Some(SynthEvent::NoteOff { note: 60 })
        );
    }

    #[test]
    fn test_decode_note_off() {
        assert_eq!(
            SynthEvent::from_midi(&[0x80, 60, 64]),
            Some(SynthEvent::NoteOff { note: 60 })
        );
    }

    #[test]
    fn test_decode_control_change() {
        assert_eq!(
            SynthEvent::from_midi(&[0xB3, 7, 127]),
            Some(SynthEvent::ControlChange { controller: 7, value: 127 })
        );
    }

    #[test]
    fn test_ignored_and_truncated_messages() {
        assert_eq!(SynthEvent::from_midi(&[]), None);
        assert_eq!(SynthEvent::from_midi(&[0x90, 60]), None);
        assert_eq!(SynthEvent::from_midi(&[0xC0, 42]), None);
        assert_eq!(SynthEvent::from_midi(&[0xE0, 0x00, 0x40]), None);
        assert_eq!(SynthEvent::from_midi(&[0xF8]), None);
    }
}
