use crate::engine::{MidiMessage, OutputSink};
use anyhow::{anyhow, bail};
use log::info;
use midir::{MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "tickwell";

/// Names of every output port the host currently exposes.
pub fn list_output_ports() -> anyhow::Result<Vec<String>> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| anyhow!("{}", e))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}

/// A hardware or virtual MIDI port opened through midir.
pub struct MidirSink {
    connection: Option<MidiOutputConnection>,
    port_name: String,
}

impl MidirSink {
    /// Open the first output port whose name contains `pattern`.
    pub fn open(pattern: &str) -> anyhow::Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| anyhow!("{}", e))?;

        let ports = midi_out.ports();
        let Some(port) = ports.iter().find(|p| {
            midi_out
                .port_name(p)
                .map(|n| n.contains(pattern))
                .unwrap_or(false)
        }) else {
            bail!("No MIDI output port matching '{}'..!", pattern);
        };

        let port_name = midi_out.port_name(port).map_err(|e| anyhow!("{}", e))?;
        let connection = midi_out
            .connect(port, "tickwell-playback")
            .map_err(|e| anyhow!("{}", e))?;

        info!("Opened MIDI output: {}", port_name);

        Ok(Self {
            connection: Some(connection),
            port_name,
        })
    }
}

impl OutputSink for MidirSink {
    fn send(&mut self, message: &MidiMessage) -> anyhow::Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            bail!("MIDI output '{}' is already closed..!", self.port_name);
        };

        connection
            .send(&message.to_bytes())
            .map_err(|e| anyhow!("{}", e))
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("Closed MIDI output: {}", self.port_name);
        }

        Ok(())
    }
}

impl Drop for MidirSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
