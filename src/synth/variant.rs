//! Synth variants: policies turning a note-on into a voice

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::crowd::{CrowdNote, CrowdSpread};
use super::envelope::Envelope;
use super::event::CC_VOLUME;
use super::note::{ModDepth, Modulator, OneNoteSynth};
use super::oscillator::Waveform;
use super::voice::Voice;
use crate::config::{VariantKind, VoiceConfig};
use crate::error::Result;

/// Frequency in Hz of a MIDI note number (A4 = 69 = 440 Hz)
pub fn freq_of_note(note: u8) -> f64 {
    440.0 * 2f64.powf((f64::from(note) - 69.0) / 12.0)
}

/// Linear velocity to volume mapping, 127 = full volume
pub fn volume_of_velocity(velocity: u8) -> f64 {
    f64::from(velocity.min(127)) / 127.0
}

/// Factory for the voices of one synth
pub trait SynthVariant: Send {
    /// Build the voice for a note-on
    fn create_note(&mut self, note: u8, velocity: u8) -> Box<dyn Voice>;

    /// React to a control change. Variants without controllers ignore it.
    fn control_change(&mut self, _controller: u8, _value: u8) {}

    /// Depth shared with this variant's voices, published by the voice table
    /// at the start of each render pass
    fn mod_depth(&self) -> Option<ModDepth> {
        None
    }

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Build the variant described by a voice configuration
pub fn from_config(config: &VoiceConfig, sample_rate: f64) -> Result<Box<dyn SynthVariant>> {
    let waveform = Waveform::from_shape(config.waveform, config.skew);
    let envelope = config.envelope;

    let variant: Box<dyn SynthVariant> = match config.variant {
        VariantKind::Simple => Box::new(SimpleSynth::new(waveform, envelope, sample_rate)),
        VariantKind::Fm => Box::new(
            FmSynth::new(waveform, envelope, sample_rate)
                .with_modulator_envelope(config.fm.envelope)
                .with_ratio(config.fm.ratio)
                .with_depth(config.fm.depth, config.fm.depth_scale),
        ),
        VariantKind::Crowd => {
            let spread =
                CrowdSpread::new(config.crowd.voices, config.crowd.freq_width, config.crowd.stereo)?;
            Box::new(CrowdSynth::new(
                waveform,
                envelope,
                spread,
                config.crowd.seed,
                sample_rate,
            ))
        }
    };
    Ok(variant)
}

/// One plain voice per note
#[derive(Debug, Clone)]
pub struct SimpleSynth {
    waveform: Waveform,
    envelope: Envelope,
    sample_rate: f64,
}

impl SimpleSynth {
    pub fn new(waveform: Waveform, envelope: Envelope, sample_rate: f64) -> Self {
        Self {
            waveform,
            envelope,
            sample_rate,
        }
    }
}

impl SynthVariant for SimpleSynth {
    fn create_note(&mut self, note: u8, velocity: u8) -> Box<dyn Voice> {
        Box::new(OneNoteSynth::new(
            freq_of_note(note),
            volume_of_velocity(velocity),
            self.waveform.clone(),
            self.envelope,
            self.sample_rate,
        ))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// One voice per note, frequency modulated by a sine modulator.
///
/// Controller 7 sets the modulation depth of every sounding note, not only
/// of notes triggered afterwards.
#[derive(Debug, Clone)]
pub struct FmSynth {
    waveform: Waveform,
    envelope: Envelope,
    modulator_envelope: Envelope,
    ratio: f64,
    depth: ModDepth,
    depth_scale: f64,
    sample_rate: f64,
}

impl FmSynth {
    pub const DEFAULT_DEPTH_SCALE: f64 = 4.0;

    pub fn new(waveform: Waveform, envelope: Envelope, sample_rate: f64) -> Self {
        Self {
            waveform,
            envelope,
            modulator_envelope: envelope,
            ratio: 1.0,
            depth: ModDepth::new(0.0),
            depth_scale: Self::DEFAULT_DEPTH_SCALE,
            sample_rate,
        }
    }

    /// Envelope of the modulator (defaults to the carrier envelope)
    pub fn with_modulator_envelope(mut self, envelope: Envelope) -> Self {
        self.modulator_envelope = envelope;
        self
    }

    /// Modulator frequency as a multiple of the carrier frequency
    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    /// Initial depth and the depth reached at controller value 127
    pub fn with_depth(self, depth: f64, depth_scale: f64) -> Self {
        self.depth.set(depth);
        self.depth.publish();
        Self {
            depth_scale,
            ..self
        }
    }

    /// Latest depth set, whether or not voices have picked it up yet
    pub fn depth(&self) -> f64 {
        self.depth.pending()
    }

    pub fn depth_scale(&self) -> f64 {
        self.depth_scale
    }
}

impl SynthVariant for FmSynth {
    fn create_note(&mut self, note: u8, velocity: u8) -> Box<dyn Voice> {
        let frequency = freq_of_note(note);
        let modulator = Modulator::new(
            frequency * self.ratio,
            self.modulator_envelope,
            self.depth.clone(),
            self.sample_rate,
        );
        Box::new(
            OneNoteSynth::new(
                frequency,
                volume_of_velocity(velocity),
                self.waveform.clone(),
                self.envelope,
                self.sample_rate,
            )
            .with_modulator(modulator),
        )
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        if controller == CC_VOLUME {
            let depth = f64::from(value.min(127)) / 127.0 * self.depth_scale;
            self.depth.set(depth);
            tracing::debug!(depth, "fm depth changed");
        }
    }

    fn mod_depth(&self) -> Option<ModDepth> {
        Some(self.depth.clone())
    }

    fn name(&self) -> &'static str {
        "fm"
    }
}

/// Detuned unison cluster per note
#[derive(Debug, Clone)]
pub struct CrowdSynth {
    waveform: Waveform,
    envelope: Envelope,
    spread: CrowdSpread,
    rng: StdRng,
    sample_rate: f64,
}

impl CrowdSynth {
    /// A fixed `seed` makes every cluster reproducible
    pub fn new(
        waveform: Waveform,
        envelope: Envelope,
        spread: CrowdSpread,
        seed: Option<u64>,
        sample_rate: f64,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            waveform,
            envelope,
            spread,
            rng,
            sample_rate,
        }
    }

    pub fn spread(&self) -> &CrowdSpread {
        &self.spread
    }
}

impl SynthVariant for CrowdSynth {
    fn create_note(&mut self, note: u8, velocity: u8) -> Box<dyn Voice> {
        Box::new(CrowdNote::new(
            freq_of_note(note),
            volume_of_velocity(velocity),
            &self.waveform,
            self.envelope,
            &self.spread,
            self.sample_rate,
            &mut self.rng,
        ))
    }

    fn name(&self) -> &'static str {
        "crowd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrowdConfig, FmConfig};
    use crate::synth::oscillator::WaveShape;
    use crate::synth::voice::Frame;

    const SR: f64 = 44100.0;
    const FLAT: Envelope = Envelope {
        attack: 0.0,
        decay: 0.0,
        sustain: 1.0,
        release: 0.0,
    };

    fn render(voice: &mut dyn Voice, frames: usize) -> Vec<Frame> {
        let mut out = vec![[0.0; 2]; frames];
        voice.render(&mut out);
        out
    }

    #[test]
    fn test_freq_of_note() {
        assert_eq!(freq_of_note(69), 440.0);
        assert_eq!(freq_of_note(57), 220.0);
        assert_eq!(freq_of_note(81), 880.0);
        assert!((freq_of_note(60) - 261.625_565).abs() < 1e-5);
    }

    #[test]
    fn test_volume_of_velocity() {
        assert_eq!(volume_of_velocity(127), 1.0);
        assert_eq!(volume_of_velocity(0), 0.0);
        assert!((volume_of_velocity(64) - 64.0 / 127.0).abs() < 1e-12);
        assert_eq!(volume_of_velocity(200), 1.0);
    }

    #[test]
    fn test_simple_synth_creates_sounding_voice() {
        let mut synth = SimpleSynth::new(Waveform::square(), FLAT, SR);
        let mut voice = synth.create_note(69, 127);

        assert!(voice.is_alive());
        let out = render(voice.as_mut(), 64);
        assert!(out.iter().all(|f| f[0].abs() == 1.0 && f[0] == f[1]));
    }

    #[test]
    fn test_fm_control_change_sets_depth() {
        let mut synth = FmSynth::new(Waveform::sine(), FLAT, SR).with_depth(0.0, 2.0);
        synth.control_change(CC_VOLUME, 127);
        assert_eq!(synth.depth(), 2.0);

        synth.control_change(CC_VOLUME, 0);
        assert_eq!(synth.depth(), 0.0);

        synth.control_change(1, 100);
        assert_eq!(synth.depth(), 0.0);
    }

    #[test]
    fn test_fm_depth_change_is_retroactive() {
        let mut fm = FmSynth::new(Waveform::sine(), FLAT, SR);
        let mut plain = SimpleSynth::new(Waveform::sine(), FLAT, SR);

        let mut fm_voice = fm.create_note(60, 127);
        let mut plain_voice = plain.create_note(60, 127);

        // Depth 0: identical to an unmodulated note
        assert_eq!(render(fm_voice.as_mut(), 256), render(plain_voice.as_mut(), 256));

        fm.control_change(CC_VOLUME, 127);
        // Staged only: the sounding voice keeps the old depth until published
        assert_eq!(render(fm_voice.as_mut(), 256), render(plain_voice.as_mut(), 256));

        fm.mod_depth().unwrap().publish();
        let a = render(fm_voice.as_mut(), 256);
        let b = render(plain_voice.as_mut(), 256);
        assert_ne!(a, b);
    }

    #[test]
    fn test_crowd_synth_reproducible_with_seed() {
        let spread = CrowdSpread::new(8, 0.01, true).unwrap();
        let mut a = CrowdSynth::new(Waveform::saw(), FLAT, spread.clone(), Some(7), SR);
        let mut b = CrowdSynth::new(Waveform::saw(), FLAT, spread, Some(7), SR);

        let mut va = a.create_note(64, 100);
        let mut vb = b.create_note(64, 100);
        let out = render(va.as_mut(), 512);
        assert_eq!(out, render(vb.as_mut(), 512));
        assert!(out.iter().any(|f| f[0] != 0.0));
    }

    #[test]
    fn test_from_config_builds_each_variant() {
        let mut config = VoiceConfig::default();
        for (kind, name) in [
            (VariantKind::Simple, "simple"),
            (VariantKind::Fm, "fm"),
            (VariantKind::Crowd, "crowd"),
        ] {
            config.variant = kind;
            let variant = from_config(&config, SR).unwrap();
            assert_eq!(variant.name(), name);
        }
    }

    #[test]
    fn test_from_config_rejects_empty_crowd() {
        let config = VoiceConfig {
            variant: VariantKind::Crowd,
            waveform: WaveShape::Triangle,
            crowd: CrowdConfig {
                voices: 0,
                ..CrowdConfig::default()
            },
            fm: FmConfig::default(),
            ..VoiceConfig::default()
        };
        assert!(from_config(&config, SR).is_err());
    }
}
