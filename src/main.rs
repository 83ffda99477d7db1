//! crowdsynth - Polyphonic MIDI synthesizer with unison crowd voices

use anyhow::{bail, Context, Result};
use clap::Parser;
use crowdsynth::analysis::{nearest_note, note_name};
use crowdsynth::config::{self, SynthConfig};
use crowdsynth::engine::{self, Engine, MidiListener, Player, Recorder, Tuner};
use crowdsynth::synth::PolySynth;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { config: config_path, port } => {
            let cfg = config::load_config(&config_path)?;
            play(&cfg, port.as_deref().or(cfg.midi.port.as_deref()))?;
        }

        Commands::Record {
            config: config_path,
            output,
            notes,
            length,
            velocity,
            chord,
            tail,
            mono,
        } => {
            let cfg = config::load_config(&config_path)?;
            if notes.iter().any(|&n| n > 127) || velocity > 127 {
                bail!("Notes and velocity must be in 0..=127");
            }
            if !(length > 0.0 && tail >= 0.0) {
                bail!("Note length must be positive and tail non-negative");
            }

            let sample_rate = cfg.audio.sample_rate;
            let hold = (length * f64::from(sample_rate)).round() as u64;
            let events = engine::note_sequence(&notes, velocity, hold, chord);
            let last_off = events.last().map_or(0, |e| e.frame);
            let total = last_off + (tail * f64::from(sample_rate)).round() as u64;

            let synth = Arc::new(PolySynth::from_config(&cfg)?);
            let mut engine = Engine::new(synth);
            let channels = if mono { 1 } else { 2 };

            println!(
                "Recording {} notes ({}) to {:?}...",
                notes.len(),
                engine.synth().variant_name(),
                output
            );
            let mut recorder = Recorder::new(&output, sample_rate, channels)?;
            recorder.record_events(&mut engine, &events, total)?;
            let seconds = recorder.duration_secs();
            recorder.finalize()?;
            println!("Recorded {:.2}s to {:?}", seconds, output);
        }

        Commands::Tune { device, duration } => {
            tune(device.as_deref(), duration.map(Duration::from_secs))?;
        }

        Commands::Devices => {
            println!("Output devices:");
            let default = engine::player::default_device_name();
            for (name, config) in engine::player::list_output_devices() {
                let marker = if default.as_deref() == Some(name.as_str()) { " [default]" } else { "" };
                println!(
                    "  - {} ({} Hz, {} ch){}",
                    name, config.sample_rate.0, config.channels, marker
                );
            }

            println!("\nInput devices:");
            for (name, config) in engine::player::list_input_devices() {
                println!("  - {} ({} Hz, {} ch)", name, config.sample_rate.0, config.channels);
            }

            println!("\nMIDI inputs:");
            match engine::list_midi_inputs() {
                Ok(ports) if ports.is_empty() => println!("  (none)"),
                Ok(ports) => {
                    for port in ports {
                        println!("  - {}", port);
                    }
                }
                Err(e) => println!("  Error listing MIDI inputs: {}", e),
            }
        }

        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  Sample rate: {} Hz", cfg.audio.sample_rate);
                    println!("  Buffer size: {}", cfg.audio.buffer_size);
                    println!("  Variant: {:?}", cfg.synth.variant);
                    println!("  Max polyphony: {}", cfg.synth.max_polyphony);
                    println!("  Output gain: {}", cfg.synth.output_gain);
                    println!("  Waveform: {:?}", cfg.synth.waveform);
                    println!("  Crowd voices: {}", cfg.synth.crowd.voices);
                }
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            let path = "crowdsynth.yaml";
            if Path::new(path).exists() {
                println!("crowdsynth.yaml already exists. Not overwriting.");
            } else {
                std::fs::write(path, config::EXAMPLE_CONFIG)?;
                println!("Created crowdsynth.yaml with example configuration.");
            }
        }
    }

    Ok(())
}

/// Flag cleared by Ctrl-C
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;
    Ok(running)
}

fn play(cfg: &SynthConfig, port: Option<&str>) -> Result<()> {
    let synth = Arc::new(PolySynth::from_config(cfg)?);
    tracing::info!(
        variant = synth.variant_name(),
        max_polyphony = synth.max_polyphony(),
        sample_rate = synth.sample_rate(),
        "synth ready"
    );

    let running = interrupt_flag()?;

    let mut player = Player::new();
    player.start(Arc::clone(&synth), cfg.audio.device.as_deref(), cfg.audio.buffer_size)?;
    let listener = MidiListener::connect(port, Arc::clone(&synth))?;

    println!("Playing from '{}'. Press Ctrl-C to stop.", listener.port_name());
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        // Release tails can end without any further events
        synth.reap();
    }

    println!("\nStopping ({} MIDI events)...", listener.events_received());
    listener.close();
    synth.all_notes_off();
    player.stop();
    Ok(())
}

fn tune(device: Option<&str>, duration: Option<Duration>) -> Result<()> {
    let running = interrupt_flag()?;
    let tuner = Tuner::start(device)?;
    println!("Listening on '{}'. Press Ctrl-C to stop.", tuner.device_name());

    let started = Instant::now();
    while running.load(Ordering::SeqCst) && duration.map_or(true, |d| started.elapsed() < d) {
        std::thread::sleep(Duration::from_millis(200));
        let Some(frequency) = tuner.latest() else {
            continue;
        };
        match nearest_note(frequency) {
            Some((note, cents)) => println!(
                "{:8.2} Hz  {:<7} {:+5.1} cents",
                frequency,
                note_name(note),
                cents
            ),
            None => println!("{:8.2} Hz", frequency),
        }
    }
    Ok(())
}
