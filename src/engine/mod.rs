use serde::{Deserialize, Serialize};

#[cfg(feature = "device")]
mod device;
mod scheduler;
mod sinks;
mod timeline;

#[cfg(feature = "device")]
pub use device::*;
pub use scheduler::*;
pub use sinks::*;
pub use timeline::*;

pub const CC_SUSTAIN: u8 = 64;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// A channel voice message as it goes out to a sink.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MidiMessage {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    PitchBend { channel: u8, value: i16 },
}

impl MidiMessage {
    /// Raw wire bytes, running status never used.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => vec![0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, pitch } => vec![0x80 | (channel & 0x0F), pitch & 0x7F, 0],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let raw = (value as i32 + 0x2000).clamp(0, 0x3FFF) as u16;
                vec![0xE0 | (channel & 0x0F), (raw & 0x7F) as u8, (raw >> 7) as u8]
            }
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }
}

/// Somewhere scheduled messages go. Each playback session owns its sink
/// exclusively and closes it exactly once when the session ends.
pub trait OutputSink: Send {
    fn send(&mut self, message: &MidiMessage) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_bytes() {
        assert_eq!(
            MidiMessage::NoteOn {
                channel: 1,
                pitch: 60,
                velocity: 100
            }
            .to_bytes(),
            vec![0x91, 60, 100]
        );
        assert_eq!(
            MidiMessage::NoteOff {
                channel: 15,
                pitch: 60
            }
            .to_bytes(),
            vec![0x8F, 60, 0]
        );
        assert_eq!(
            MidiMessage::ControlChange {
                channel: 0,
                controller: CC_ALL_NOTES_OFF,
                value: 0
            }
            .to_bytes(),
            vec![0xB0, 123, 0]
        );
        assert_eq!(
            MidiMessage::PitchBend {
                channel: 3,
                value: 0
            }
            .to_bytes(),
            vec![0xE3, 0x00, 0x40]
        );
    }
}
