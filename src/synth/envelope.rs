//! ADSR envelope generator
//!
//! Attack-Decay-Sustain-Release gain curve for amplitude shaping. The
//! configuration is an immutable value shared by every voice built from it;
//! each voice owns its own [`EnvelopeGain`] state machine.

use serde::{Deserialize, Serialize};

/// ADSR configuration: durations in seconds, sustain as a level in 0.0-1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Envelope {
    /// Near-instant onset and release, full sustain
    pub const DEFAULT: Envelope = Envelope {
        attack: 1e-3,
        decay: 0.0,
        sustain: 1.0,
        release: 1e-3,
    };

    /// Soft organ-like shape
    pub const ORGAN: Envelope = Envelope {
        attack: 0.01,
        decay: 0.05,
        sustain: 0.8,
        release: 0.2,
    };

    /// Create an envelope, clamping durations to >= 0 and sustain to 0.0-1.0
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack: non_negative(attack),
            decay: non_negative(decay),
            sustain: if sustain.is_finite() { sustain.clamp(0.0, 1.0) } else { 1.0 },
            release: non_negative(release),
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

/// Envelope phase. Only ever advances in declaration order, except that
/// [`EnvelopeGain::release`] jumps straight to `Release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvelopePhase {
    Attack,
    Decay,
    Sustain,
    Release,
    Finished,
}

/// Per-voice envelope state
#[derive(Debug, Clone)]
pub struct EnvelopeGain {
    config: Envelope,
    sample_rate: f64,
    phase: EnvelopePhase,
    /// Samples elapsed since note-on, or since release once released
    elapsed: u64,
    level: f64,
    release_start_level: f64,
}

impl EnvelopeGain {
    /// Start a new envelope at the beginning of its attack
    pub fn new(config: Envelope, sample_rate: f64) -> Self {
        let config = Envelope::new(config.attack, config.decay, config.sustain, config.release);
        Self {
            config,
            sample_rate,
            phase: EnvelopePhase::Attack,
            elapsed: 0,
            level: 0.0,
            release_start_level: 0.0,
        }
    }

    /// The configuration driving this envelope
    pub fn config(&self) -> &Envelope {
        &self.config
    }

    /// Current phase
    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Gain of the most recently produced sample
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Level captured when the release began
    pub fn release_start_level(&self) -> f64 {
        self.release_start_level
    }

    /// True once the release tail has reached zero
    pub fn is_finished(&self) -> bool {
        self.phase == EnvelopePhase::Finished
    }

    /// Enter the release phase from wherever the envelope is.
    ///
    /// Idempotent: a second call while releasing or finished does nothing.
    pub fn release(&mut self) {
        if self.phase < EnvelopePhase::Release {
            self.release_start_level = self.level;
            self.phase = EnvelopePhase::Release;
            self.elapsed = 0;
        }
    }

    /// Fill `out` with the next `out.len()` gain values
    pub fn advance(&mut self, out: &mut [f64]) {
        for gain in out.iter_mut() {
            *gain = self.next_gain();
        }
    }

    /// Produce one gain value and step the clock
    pub fn next_gain(&mut self) -> f64 {
        let t = self.elapsed as f64 / self.sample_rate;
        let Envelope {
            attack,
            decay,
            sustain,
            release,
        } = self.config;

        let gain = match self.phase {
            EnvelopePhase::Finished => 0.0,
            EnvelopePhase::Release => {
                // The ramp spans ceil(release * rate) samples and finishes on its last one
                let ramp = (release * self.sample_rate).ceil() as u64;
                if ramp == 0 {
                    self.phase = EnvelopePhase::Finished;
                    0.0
                } else {
                    if self.elapsed + 1 >= ramp {
                        self.phase = EnvelopePhase::Finished;
                    }
                    self.release_start_level * (1.0 - t / release)
                }
            }
            _ => {
                if attack > 0.0 && t < attack {
                    self.phase = EnvelopePhase::Attack;
                    t / attack
                } else if decay > 0.0 && t < attack + decay {
                    self.phase = EnvelopePhase::Decay;
                    1.0 + (t - attack) * (sustain - 1.0) / decay
                } else {
                    self.phase = EnvelopePhase::Sustain;
                    sustain
                }
            }
        };

        if self.phase != EnvelopePhase::Finished {
            self.elapsed += 1;
        }
        self.level = gain;
        gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn run(env: &mut EnvelopeGain, frames: usize) -> Vec<f64> {
        let mut out = vec![0.0; frames];
        env.advance(&mut out);
        out
    }

    #[test]
    fn test_envelope_starts_in_attack() {
        let env = EnvelopeGain::new(Envelope::ORGAN, SR);
        assert_eq!(env.phase(), EnvelopePhase::Attack);
        assert_eq!(env.level(), 0.0);
        assert!(!env.is_finished());
    }

    #[test]
    fn test_envelope_clamps_configuration() {
        let env = Envelope::new(-1.0, f64::NAN, 3.0, -0.5);
        assert_eq!(env.attack, 0.0);
        assert_eq!(env.decay, 0.0);
        assert_eq!(env.sustain, 1.0);
        assert_eq!(env.release, 0.0);
    }

    #[test]
    fn test_envelope_attack_ramp() {
        let mut env = EnvelopeGain::new(Envelope::new(0.01, 0.0, 1.0, 0.01), SR);
        let gains = run(&mut env, 441);

        assert_eq!(gains[0], 0.0);
        assert!((gains[220] - 220.0 / 441.0).abs() < 1e-9);
        assert!(gains.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(env.phase(), EnvelopePhase::Attack);

        run(&mut env, 1);
        assert_eq!(env.phase(), EnvelopePhase::Sustain);
        assert_eq!(env.level(), 1.0);
    }

    #[test]
    fn test_envelope_decay_reaches_sustain() {
        let mut env = EnvelopeGain::new(Envelope::new(0.001, 0.01, 0.5, 0.01), SR);
        run(&mut env, 2000);

        assert_eq!(env.phase(), EnvelopePhase::Sustain);
        assert!((env.level() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_envelope_zero_attack_and_decay_jumps_to_sustain() {
        let mut env = EnvelopeGain::new(Envelope::new(0.0, 0.0, 0.7, 0.1), SR);
        let gains = run(&mut env, 4);

        assert!(gains.iter().all(|&g| g == 0.7));
        assert_eq!(env.phase(), EnvelopePhase::Sustain);
    }

    #[test]
    fn test_envelope_zero_attack_starts_decay_at_full_level() {
        let mut env = EnvelopeGain::new(Envelope::new(0.0, 0.01, 0.5, 0.1), SR);
        let gains = run(&mut env, 2);

        assert_eq!(gains[0], 1.0);
        assert!(gains[1] < 1.0);
        assert_eq!(env.phase(), EnvelopePhase::Decay);
    }

    #[test]
    fn test_envelope_release_from_attack_captures_level() {
        let mut env = EnvelopeGain::new(Envelope::new(0.1, 0.0, 1.0, 0.01), SR);
        run(&mut env, 441);
        let level = env.level();
        assert!(level > 0.09 && level < 0.11);

        env.release();
        assert_eq!(env.phase(), EnvelopePhase::Release);
        assert_eq!(env.release_start_level(), level);

        let gains = run(&mut env, 1);
        assert_eq!(gains[0], level);
    }

    #[test]
    fn test_envelope_release_is_idempotent() {
        let mut env = EnvelopeGain::new(Envelope::new(0.0, 0.0, 0.8, 0.01), SR);
        run(&mut env, 10);
        env.release();
        run(&mut env, 100);
        let mid_level = env.level();

        env.release();
        assert_eq!(env.release_start_level(), 0.8);
        let next = run(&mut env, 1)[0];
        assert!(next < mid_level);
    }

    #[test]
    fn test_envelope_release_finishes() {
        let mut env = EnvelopeGain::new(Envelope::new(0.001, 0.001, 0.5, 0.01), SR);
        run(&mut env, 200);
        env.release();

        run(&mut env, 440);
        assert_eq!(env.phase(), EnvelopePhase::Release);

        // The 441st sample completes 10 ms of release
        let last = run(&mut env, 1)[0];
        assert!(last > 0.0 && last < 0.01);
        assert!(env.is_finished());

        let tail = run(&mut env, 10);
        assert!(tail.iter().all(|&g| g == 0.0));

        // Stays finished and silent
        env.release();
        assert!(env.is_finished());
        assert!(run(&mut env, 64).iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_envelope_finishes_within_release_time() {
        for release in [0.001, 0.0105, 0.02, 0.1] {
            let mut env = EnvelopeGain::new(Envelope::new(0.0, 0.0, 1.0, release), SR);
            run(&mut env, 32);
            env.release();

            let frames = (release * SR).ceil() as usize;
            let gains = run(&mut env, frames - 1);
            assert!(!env.is_finished(), "release {} ended early", release);
            assert!(gains.iter().all(|&g| g > 0.0));

            run(&mut env, 1);
            assert!(env.is_finished(), "release {} still running", release);
        }
    }

    #[test]
    fn test_envelope_zero_release_is_instant() {
        let mut env = EnvelopeGain::new(Envelope::new(0.0, 0.0, 1.0, 0.0), SR);
        run(&mut env, 10);
        env.release();

        assert_eq!(run(&mut env, 1)[0], 0.0);
        assert!(env.is_finished());
    }

    #[test]
    fn test_envelope_is_continuous_across_phases() {
        let config = Envelope::new(0.01, 0.02, 0.4, 0.03);
        let mut env = EnvelopeGain::new(config, SR);
        let mut gains = run(&mut env, 2000);
        env.release();
        gains.extend(run(&mut env, 2000));

        let max_step = [
            1.0 / (config.attack * SR),
            (1.0 - config.sustain) / (config.decay * SR),
            config.sustain / (config.release * SR),
        ]
        .into_iter()
        .fold(0.0f64, f64::max);

        for pair in gains.windows(2) {
            assert!(
                (pair[1] - pair[0]).abs() <= max_step + 1e-9,
                "jump of {} exceeds ramp slope {}",
                (pair[1] - pair[0]).abs(),
                max_step
            );
        }
    }

    #[test]
    fn test_envelope_block_size_does_not_matter() {
        let config = Envelope::new(0.003, 0.004, 0.6, 0.005);
        let mut whole = EnvelopeGain::new(config, SR);
        let mut split = EnvelopeGain::new(config, SR);

        let a = run(&mut whole, 512);
        let mut b = run(&mut split, 128);
        b.extend(run(&mut split, 384));

        assert_eq!(a, b);
    }
}
