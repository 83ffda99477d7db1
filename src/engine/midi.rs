//! MIDI input for crowdsynth.
//!
//! Decodes incoming messages and applies them to the shared synth from the
//! MIDI driver's thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::synth::{PolySynth, SynthEvent};

/// Live MIDI input connection. Dropping it closes the port.
pub struct MidiListener {
    connection: MidiInputConnection<()>,
    port_name: String,
    events: Arc<AtomicU64>,
}

impl MidiListener {
    /// Connect to the input port whose name contains `port_name`, or to the
    /// first port, and forward its events to `synth`.
    pub fn connect(port_name: Option<&str>, synth: Arc<PolySynth>) -> Result<Self> {
        let mut midi_in = MidiInput::new("crowdsynth input")?;
        midi_in.ignore(Ignore::All);
        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_default())
            .collect();

        let index = select_port(&names, port_name)?;
        let port = &ports[index];
        let port_name_actual = names[index].clone();
        let events = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&events);

        let connection = midi_in
            .connect(
                port,
                "crowdsynth-input",
                move |_stamp, message, _| {
                    if let Some(event) = SynthEvent::from_midi(message) {
                        tracing::trace!(?event, "midi event");
                        synth.handle(event);
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to MIDI port: {}", e))?;

        tracing::info!(port = %port_name_actual, "MIDI input connected");

        Ok(Self {
            connection,
            port_name: port_name_actual,
            events,
        })
    }

    /// Name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Number of events applied so far
    pub fn events_received(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Disconnect from the port
    pub fn close(self) {
        let (_input, ()) = self.connection.close();
        tracing::info!(port = %self.port_name, "MIDI input closed");
    }
}

/// Index of the first port whose name contains `wanted`, or of the first
/// port when no name is given
fn select_port(names: &[String], wanted: Option<&str>) -> Result<usize> {
    if names.is_empty() {
        return Err(anyhow!("No MIDI input ports available"));
    }
    match wanted {
        None => Ok(0),
        Some(wanted) => names
            .iter()
            .position(|n| n.contains(wanted))
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", wanted)),
    }
}

/// List available MIDI input ports.
pub fn list_midi_inputs() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("crowdsynth list")?;
    let ports = midi_in.ports();

    let names: Vec<String> = ports
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();

    Ok(names)
}
