use crate::engine::{MidiMessage, OutputSink};
use anyhow::bail;
use log::info;
use std::sync::{Arc, Mutex};

/// Keeps every message in memory. Clones share the same buffer, so a caller can
/// hand one clone to the scheduler and inspect the other afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<MidiMessage>>>,
    closed: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(false)
    }
}

impl OutputSink for RecordingSink {
    fn send(&mut self, message: &MidiMessage) -> anyhow::Result<()> {
        let Ok(mut messages) = self.messages.lock() else {
            bail!("Failed to lock recorded messages..!");
        };
        messages.push(*message);

        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        let Ok(mut closed) = self.closed.lock() else {
            bail!("Failed to lock recording sink state..!");
        };
        *closed = true;

        Ok(())
    }
}

/// Writes each message to the log instead of a device.
#[derive(Debug, Default)]
pub struct LogSink {
    sent: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for LogSink {
    fn send(&mut self, message: &MidiMessage) -> anyhow::Result<()> {
        self.sent += 1;
        info!(
            "{:>6} | {:02X?} | {:?}",
            self.sent,
            message.to_bytes(),
            message
        );

        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        info!("Log sink closed after {} message(s)..!", self.sent);
        Ok(())
    }
}
