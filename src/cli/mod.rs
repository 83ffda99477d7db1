//! CLI interface for crowdsynth

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Polyphonic MIDI synthesizer with unison crowd voices
#[derive(Parser)]
#[command(name = "crowdsynth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play MIDI input through the synth until Ctrl-C
    Play {
        /// Configuration file path
        #[arg(short, long, default_value = "crowdsynth.yaml")]
        config: PathBuf,

        /// MIDI input port name (overrides the configuration)
        #[arg(short, long)]
        port: Option<String>,
    },

    /// Render a note sequence to a WAV file
    Record {
        /// Configuration file path
        #[arg(short, long, default_value = "crowdsynth.yaml")]
        config: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// MIDI note numbers, comma separated
        #[arg(short, long, value_delimiter = ',', default_value = "60,64,67,72")]
        notes: Vec<u8>,

        /// Seconds each note is held
        #[arg(short, long, default_value = "0.5")]
        length: f64,

        /// Note-on velocity
        #[arg(short, long, default_value = "100")]
        velocity: u8,

        /// Start all notes together
        #[arg(long)]
        chord: bool,

        /// Seconds recorded after the last note-off
        #[arg(long, default_value = "1.0")]
        tail: f64,

        /// Write a single channel instead of stereo
        #[arg(long)]
        mono: bool,
    },

    /// Show the pitch heard on an input device
    Tune {
        /// Input device name
        #[arg(short, long)]
        device: Option<String>,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(short = 't', long)]
        duration: Option<u64>,
    },

    /// List audio devices and MIDI inputs
    Devices,

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "crowdsynth.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from([
            "crowdsynth", "record", "-o", "out.wav", "--notes", "57,69", "--chord", "--mono",
        ])
        .unwrap();
        match cli.command {
            Commands::Record { notes, chord, mono, length, .. } => {
                assert_eq!(notes, vec![57, 69]);
                assert!(chord);
                assert!(mono);
                assert_eq!(length, 0.5);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_parse_play_defaults() {
        let cli = Cli::try_parse_from(["crowdsynth", "play"]).unwrap();
        match cli.command {
            Commands::Play { config, port } => {
                assert_eq!(config, PathBuf::from("crowdsynth.yaml"));
                assert_eq!(port, None);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_rejects_out_of_range_note() {
        assert!(Cli::try_parse_from(["crowdsynth", "record", "-o", "x.wav", "--notes", "300"]).is_err());
    }
}
