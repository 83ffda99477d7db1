//! Configuration schema definitions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::synth::{Envelope, WaveShape};

/// Main configuration for crowdsynth
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Audio device settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Voice generation settings
    #[serde(default)]
    pub synth: VoiceConfig,

    /// MIDI input settings
    #[serde(default)]
    pub midi: MidiConfig,
}

impl SynthConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 192000 {
            bail!("Sample rate must be between 8000 and 192000");
        }
        if self.audio.buffer_size < 16 || self.audio.buffer_size > 8192 {
            bail!("Buffer size must be between 16 and 8192");
        }

        // Validate voice settings
        let synth = &self.synth;
        if synth.max_polyphony == 0 {
            bail!("Max polyphony must be at least 1");
        }
        if !synth.output_gain.is_finite() || synth.output_gain < 0.0 {
            bail!("Output gain must be a non-negative number");
        }
        if !(0.0..=1.0).contains(&synth.skew) {
            bail!("Skew must be between 0.0 and 1.0");
        }
        check_envelope("synth.envelope", &synth.envelope)?;

        // Validate FM settings
        if !synth.fm.ratio.is_finite() || synth.fm.ratio <= 0.0 {
            bail!("FM ratio must be positive");
        }
        if !synth.fm.depth.is_finite() || !synth.fm.depth_scale.is_finite() {
            bail!("FM depth and depth_scale must be finite");
        }
        check_envelope("synth.fm.envelope", &synth.fm.envelope)?;

        // Validate crowd settings
        if synth.crowd.voices == 0 {
            bail!("Crowd must have at least one voice");
        }
        if !synth.crowd.freq_width.is_finite() || synth.crowd.freq_width < 0.0 {
            bail!("Crowd freq_width must be a non-negative number");
        }

        Ok(())
    }
}

fn check_envelope(name: &str, envelope: &Envelope) -> Result<()> {
    for (field, value) in [
        ("attack", envelope.attack),
        ("decay", envelope.decay),
        ("release", envelope.release),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{}.{} must be a non-negative duration in seconds", name, field);
        }
    }
    if !(0.0..=1.0).contains(&envelope.sustain) {
        bail!("{}.sustain must be between 0.0 and 1.0", name);
    }
    Ok(())
}

/// Audio device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per device callback (default: 256)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Output device name (None = default device)
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_size: default_buffer_size(),
            device: None,
        }
    }
}

fn default_sample_rate() -> u32 { 44100 }
fn default_buffer_size() -> usize { 256 }

/// Which policy turns note-ons into voices
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// One plain voice per note
    Simple,
    /// One frequency-modulated voice per note, depth on CC 7
    Fm,
    /// Detuned unison cluster per note
    #[default]
    Crowd,
}

/// Voice generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Synth variant (default: crowd)
    #[serde(default)]
    pub variant: VariantKind,

    /// Notes sounding at once before the oldest is stolen (default: 16)
    #[serde(default = "default_max_polyphony")]
    pub max_polyphony: usize,

    /// Gain applied to the mix (default: 0.3)
    #[serde(default = "default_output_gain")]
    pub output_gain: f64,

    /// Carrier waveform (default: offset_triangle)
    #[serde(default = "default_waveform")]
    pub waveform: WaveShape,

    /// Peak position of the offset triangle (default: 0.2)
    #[serde(default = "default_skew")]
    pub skew: f64,

    /// Carrier envelope
    #[serde(default = "default_envelope")]
    pub envelope: Envelope,

    /// FM variant settings
    #[serde(default)]
    pub fm: FmConfig,

    /// Crowd variant settings
    #[serde(default)]
    pub crowd: CrowdConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            variant: VariantKind::default(),
            max_polyphony: default_max_polyphony(),
            output_gain: default_output_gain(),
            waveform: default_waveform(),
            skew: default_skew(),
            envelope: default_envelope(),
            fm: FmConfig::default(),
            crowd: CrowdConfig::default(),
        }
    }
}

fn default_max_polyphony() -> usize { 16 }
fn default_output_gain() -> f64 { 0.3 }
fn default_waveform() -> WaveShape { WaveShape::OffsetTriangle }
fn default_skew() -> f64 { 0.2 }
fn default_envelope() -> Envelope { Envelope::ORGAN }

/// FM variant settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmConfig {
    /// Modulator frequency over carrier frequency (default: 1.0)
    #[serde(default = "default_ratio")]
    pub ratio: f64,

    /// Initial modulation depth (default: 0.0)
    #[serde(default)]
    pub depth: f64,

    /// Depth reached at controller value 127 (default: 4.0)
    #[serde(default = "default_depth_scale")]
    pub depth_scale: f64,

    /// Modulator envelope
    #[serde(default = "default_fm_envelope")]
    pub envelope: Envelope,
}

impl Default for FmConfig {
    fn default() -> Self {
        Self {
            ratio: default_ratio(),
            depth: 0.0,
            depth_scale: default_depth_scale(),
            envelope: default_fm_envelope(),
        }
    }
}

fn default_ratio() -> f64 { 1.0 }
fn default_depth_scale() -> f64 { 4.0 }
fn default_fm_envelope() -> Envelope { Envelope::new(0.0, 0.0, 1.0, 0.2) }

/// Crowd variant settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdConfig {
    /// Sub-voices per note (default: 50)
    #[serde(default = "default_crowd_voices")]
    pub voices: usize,

    /// Standard deviation of the relative detune (default: 0.01)
    #[serde(default = "default_freq_width")]
    pub freq_width: f64,

    /// Random stereo placement of sub-voices (default: true)
    #[serde(default = "default_stereo")]
    pub stereo: bool,

    /// Fixed RNG seed for reproducible clusters
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            voices: default_crowd_voices(),
            freq_width: default_freq_width(),
            stereo: default_stereo(),
            seed: None,
        }
    }
}

fn default_crowd_voices() -> usize { 50 }
fn default_freq_width() -> f64 { 0.01 }
fn default_stereo() -> bool { true }

/// MIDI input settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Input port name (None = first available port)
    #[serde(default)]
    pub port: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_audio_config() {
        let yaml = "sample_rate: 48000";
        let config: AudioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.buffer_size, 256); // default
        assert_eq!(config.device, None);
    }

    #[test]
    fn test_voice_config_defaults() {
        let config: VoiceConfig = serde_yaml::from_str("variant: fm").unwrap();
        assert_eq!(config.variant, VariantKind::Fm);
        assert_eq!(config.max_polyphony, 16);
        assert_eq!(config.waveform, WaveShape::OffsetTriangle);
        assert_eq!(config.envelope, Envelope::ORGAN);
        assert_eq!(config.fm.depth_scale, 4.0);
        assert_eq!(config.crowd.voices, 50);
    }

    #[test]
    fn test_voice_config() {
        let yaml = r#"
variant: crowd
max_polyphony: 8
output_gain: 0.5
waveform: saw
envelope: { attack: 0.1, decay: 0.2, sustain: 0.5, release: 1.0 }
crowd:
  voices: 12
  freq_width: 0.02
  stereo: false
  seed: 99
"#;
        let config: VoiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_polyphony, 8);
        assert_eq!(config.waveform, WaveShape::Saw);
        assert_eq!(config.envelope, Envelope::new(0.1, 0.2, 0.5, 1.0));
        assert_eq!(config.crowd.voices, 12);
        assert!(!config.crowd.stereo);
        assert_eq!(config.crowd.seed, Some(99));
    }

    #[test]
    fn test_unknown_variant_rejected() {
        assert!(serde_yaml::from_str::<VoiceConfig>("variant: granular").is_err());
    }

    #[test]
    fn test_config_validation() {
        let config = SynthConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SynthConfig::default();
        config.audio.sample_rate = 4000;
        assert!(config.validate().is_err());

        let mut config = SynthConfig::default();
        config.synth.max_polyphony = 0;
        assert!(config.validate().is_err());

        let mut config = SynthConfig::default();
        config.synth.envelope.sustain = 1.5;
        assert!(config.validate().is_err());

        let mut config = SynthConfig::default();
        config.synth.fm.envelope.release = -1.0;
        assert!(config.validate().is_err());

        let mut config = SynthConfig::default();
        config.synth.crowd.freq_width = f64::NAN;
        assert!(config.validate().is_err());
    }
}
