use crate::error::DecodeError;
use crate::model::sequence::*;
use crate::notation::{key_name, pitch_to_note_name};
use log::{debug, warn};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};

const HEADER_LEN: usize = 14;
const END_OF_TRACK: [u8; 3] = [0xFF, 0x2F, 0x00];

/// NoteOns waiting for their release, oldest first per (channel, key).
type OpenNotes = HashMap<(u8, u8), VecDeque<(Tick, u8)>>;

/// Parse Standard MIDI File bytes into a canonical sequence.
pub fn decode(bytes: &[u8]) -> Result<Sequence, DecodeError> {
    check_framing(bytes)?;

    let smf = Smf::parse(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;

    let ppq = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(_fps, _subframe) => return Err(DecodeError::UnsupportedTiming),
    };

    let format = match smf.header.format {
        Format::SingleTrack => 0,
        Format::Parallel => 1,
        Format::Sequential => return Err(DecodeError::UnsupportedFormat(2)),
    };

    debug!("Ticks per quarter note: {}", ppq);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut sequence = Sequence::new(format, ppq);
    let mut global: Vec<Event> = Vec::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut out = Track::default();
        let mut open_notes: OpenNotes = HashMap::new();
        let mut abs_tick: Tick = 0;

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as Tick);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let us_per_quarter: u32 = micro.as_int();
                        global.push(Event::Tempo(Tempo {
                            tick: abs_tick,
                            us_per_quarter,
                        }));
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, us_per_quarter, track_idx
                        );
                    }
                    MetaMessage::TimeSignature(numerator, denominator_pow, _, _) => {
                        global.push(Event::TimeSignature(TimeSignature {
                            tick: abs_tick,
                            numerator: *numerator,
                            denominator: 1u8.checked_shl(*denominator_pow as u32).unwrap_or(4),
                        }));
                    }
                    MetaMessage::KeySignature(sf, minor) => {
                        let mi = *minor as u8;
                        global.push(Event::KeySignature(KeySignature {
                            tick: abs_tick,
                            sf: *sf,
                            mi,
                            key: Some(key_name(*sf, mi)),
                        }));
                    }
                    MetaMessage::TrackName(bytes) => {
                        let text = String::from_utf8_lossy(bytes).into_owned();
                        if abs_tick == 0 && out.name.is_none() {
                            debug!("Track name: {}", text);
                            out.name = Some(text);
                        } else {
                            out.events.push(Event::TrackName(Text {
                                tick: abs_tick,
                                text,
                            }));
                        }
                    }
                    MetaMessage::Marker(bytes) => {
                        out.events.push(Event::Marker(Text {
                            tick: abs_tick,
                            text: String::from_utf8_lossy(bytes).into_owned(),
                        }));
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();
                    out.channel.get_or_insert(ch);

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            let velocity: u8 = vel.as_int();

                            if velocity == 0 {
                                close_note(&mut open_notes, &mut out.events, ch, key.as_int(), abs_tick);
                            } else {
                                open_notes
                                    .entry((ch, key.as_int()))
                                    .or_default()
                                    .push_back((abs_tick, velocity));
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(&mut open_notes, &mut out.events, ch, key.as_int(), abs_tick);
                        }
                        MidiMessage::Controller { controller, value } => {
                            out.events.push(Event::Cc(ControlChange {
                                tick: abs_tick,
                                controller: controller.as_int(),
                                value: value.as_int(),
                                channel: ch,
                            }));
                        }
                        MidiMessage::ProgramChange { program } => {
                            out.events.push(Event::Program(ProgramChange {
                                tick: abs_tick,
                                program: program.as_int(),
                                channel: ch,
                            }));
                        }
                        MidiMessage::PitchBend { bend } => {
                            out.events.push(Event::PitchBend(PitchBend {
                                tick: abs_tick,
                                value: (bend.0.as_int() as i32 - 0x2000) as i16,
                                channel: ch,
                            }));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        for ((ch, key), pending) in open_notes.into_iter() {
            for (start_tick, start_vel) in pending {
                let end_tick = if abs_tick > start_tick {
                    abs_tick
                } else {
                    start_tick + ppq as Tick
                };

                out.events.push(note(ch, key, start_tick, end_tick, start_vel));

                warn!(
                    "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                    key, ch, start_tick, end_tick
                );
            }
        }

        out.events.sort_by_key(|e| e.tick());
        sequence.tracks.push(out);
    }

    if sequence.tracks.is_empty() {
        sequence.tracks.push(Track::default());
    }

    // Document-level meta lives in the first track.
    let first = &mut sequence.tracks[0];
    global.append(&mut first.events);
    global.sort_by_key(|e| e.tick());
    first.events = global;

    Ok(sequence)
}

fn note(channel: u8, pitch: u8, start_tick: Tick, end_tick: Tick, velocity: u8) -> Event {
    Event::Note(Note {
        tick: start_tick,
        pitch,
        velocity,
        duration: end_tick.saturating_sub(start_tick).max(1),
        channel,
        name: Some(pitch_to_note_name(pitch)),
    })
}

fn close_note(
    open_notes: &mut OpenNotes,
    events: &mut Vec<Event>,
    ch: u8,
    midi_num: u8,
    abs_tick: Tick,
) {
    if let Some((start_tick, start_vel)) = open_notes
        .get_mut(&(ch, midi_num))
        .and_then(|pending| pending.pop_front())
    {
        events.push(note(ch, midi_num, start_tick, abs_tick, start_vel));
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

/// Walk the chunk layout before handing bytes to the parser, so truncated or
/// unterminated files are rejected instead of silently repaired.
fn check_framing(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::MalformedHeader(format!(
            "{} bytes is shorter than a header chunk",
            bytes.len()
        )));
    }

    if &bytes[0..4] != b"MThd" {
        return Err(DecodeError::MalformedHeader(String::from("missing MThd magic")));
    }

    let header_len = be_u32(bytes, 4);
    if header_len < 6 {
        return Err(DecodeError::MalformedHeader(format!(
            "header length {} is shorter than 6",
            header_len
        )));
    }
    if 8 + header_len > bytes.len() {
        return Err(DecodeError::TruncatedChunk {
            index: 0,
            declared: header_len,
            available: bytes.len() - 8,
        });
    }

    let format = be_u16(bytes, 8);
    if format > 1 {
        return Err(DecodeError::UnsupportedFormat(format));
    }
    if be_u16(bytes, 12) & 0x8000 != 0 {
        return Err(DecodeError::UnsupportedTiming);
    }

    let declared_tracks = be_u16(bytes, 10) as usize;
    let mut offset = 8 + header_len;
    let mut chunk_index = 1;
    let mut tracks_found = 0;

    while offset < bytes.len() {
        if offset + 8 > bytes.len() {
            return Err(DecodeError::TruncatedChunk {
                index: chunk_index,
                declared: 8,
                available: bytes.len() - offset,
            });
        }

        let len = be_u32(bytes, offset + 4);
        let body = offset + 8;
        if body + len > bytes.len() {
            return Err(DecodeError::TruncatedChunk {
                index: chunk_index,
                declared: len,
                available: bytes.len() - body,
            });
        }

        if &bytes[offset..offset + 4] == b"MTrk" {
            if len < END_OF_TRACK.len() || bytes[body + len - 3..body + len] != END_OF_TRACK {
                return Err(DecodeError::UnterminatedTrack(tracks_found));
            }
            tracks_found += 1;
        } else {
            debug!("Skipping unknown chunk #{}", chunk_index);
        }

        offset = body + len;
        chunk_index += 1;
    }

    if tracks_found < declared_tracks {
        return Err(DecodeError::MalformedHeader(format!(
            "header declares {} track(s) but only {} present",
            declared_tracks, tracks_found
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::encoder::{EncodeOptions, encode, encode_with};
    use pretty_assertions::assert_eq;

    fn sample() -> Sequence {
        let mut sequence = Sequence::new(1, 480);
        sequence.tracks.push(Track {
            name: Some(String::from("Piano")),
            channel: Some(0),
            events: vec![
                Event::Tempo(Tempo {
                    tick: 0,
                    us_per_quarter: 500_000,
                }),
                Event::TimeSignature(TimeSignature {
                    tick: 0,
                    numerator: 6,
                    denominator: 8,
                }),
                Event::KeySignature(KeySignature {
                    tick: 0,
                    sf: -3,
                    mi: 1,
                    key: None,
                }),
                Event::Note(Note {
                    tick: 0,
                    pitch: 60,
                    velocity: 90,
                    duration: 480,
                    channel: 0,
                    name: None,
                }),
                Event::Note(Note {
                    tick: 480,
                    pitch: 60,
                    velocity: 70,
                    duration: 240,
                    channel: 0,
                    name: None,
                }),
                Event::Marker(Text {
                    tick: 720,
                    text: String::from("B section"),
                }),
                Event::Tempo(Tempo {
                    tick: 960,
                    us_per_quarter: 400_000,
                }),
            ],
        });
        sequence.tracks.push(Track {
            name: Some(String::from("Strings")),
            channel: Some(5),
            events: vec![
                Event::Program(ProgramChange {
                    tick: 0,
                    program: 48,
                    channel: 5,
                }),
                Event::Cc(ControlChange {
                    tick: 10,
                    controller: 64,
                    value: 127,
                    channel: 5,
                }),
                Event::PitchBend(PitchBend {
                    tick: 20,
                    value: -1234,
                    channel: 5,
                }),
                Event::Note(Note {
                    tick: 30,
                    pitch: 127,
                    velocity: 127,
                    duration: 100_000,
                    channel: 5,
                    name: None,
                }),
                Event::Note(Note {
                    tick: 30,
                    pitch: 0,
                    velocity: 1,
                    duration: 1,
                    channel: 5,
                    name: None,
                }),
            ],
        });

        sequence
    }

    fn note_fields(sequence: &Sequence) -> Vec<(Tick, u8, u8, Tick, u8)> {
        let mut notes: Vec<_> = sequence
            .notes()
            .map(|n| (n.tick, n.pitch, n.velocity, n.duration, n.channel))
            .collect();
        notes.sort();
        notes
    }

    #[test]
    fn round_trip_preserves_notes_and_channels() {
        env_logger::try_init().unwrap_or(());

        let original = sample();
        let decoded = decode(&encode(&original)).unwrap();

        assert_eq!(decoded.format, 1);
        assert_eq!(decoded.ppq, 480);
        assert_eq!(decoded.tracks.len(), 2);
        assert_eq!(note_fields(&decoded), note_fields(&original));
        assert_eq!(decoded.tracks[0].name.as_deref(), Some("Piano"));
        assert_eq!(decoded.tracks[1].name.as_deref(), Some("Strings"));
        assert_eq!(decoded.tracks[1].channel, Some(5));
        assert_eq!(decoded.tempo_changes(), original.tempo_changes());
    }

    #[test]
    fn round_trip_preserves_controls_and_meta() {
        let decoded = decode(&encode(&sample())).unwrap();

        let bend = decoded
            .events()
            .find_map(|e| match e {
                Event::PitchBend(b) => Some(*b),
                _ => None,
            })
            .unwrap();
        assert_eq!((bend.tick, bend.value, bend.channel), (20, -1234, 5));

        let key = decoded
            .events()
            .find_map(|e| match e {
                Event::KeySignature(k) => Some(k.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!((key.sf, key.mi), (-3, 1));
        assert_eq!(key.key.as_deref(), Some("C minor"));

        assert_eq!(decoded.time_signatures()[0].denominator, 8);
        assert!(decoded.events().any(|e| matches!(
            e,
            Event::Marker(Text { tick: 720, text }) if text == "B section"
        )));
        assert!(decoded.events().any(|e| matches!(
            e,
            Event::Cc(ControlChange { tick: 10, controller: 64, value: 127, channel: 5 })
        )));
    }

    #[test]
    fn decoded_notes_carry_names() {
        let decoded = decode(&encode(&sample())).unwrap();
        let first = decoded.notes().find(|n| n.pitch == 60).unwrap();

        assert_eq!(first.name.as_deref(), Some("C4"));
    }

    #[test]
    fn format_zero_round_trip_keeps_every_note() {
        let original = sample();
        let decoded = decode(&encode_with(&original, &EncodeOptions { format: Some(0) })).unwrap();

        assert_eq!(decoded.format, 0);
        assert_eq!(decoded.tracks.len(), 1);
        assert_eq!(note_fields(&decoded), note_fields(&original));
    }

    #[test]
    fn overlapping_repeats_release_oldest_first() {
        let mut sequence = Sequence::new(1, 480);
        sequence.tracks.push(Track {
            name: None,
            channel: Some(0),
            events: vec![
                Event::Note(Note {
                    tick: 0,
                    pitch: 60,
                    velocity: 90,
                    duration: 960,
                    channel: 0,
                    name: None,
                }),
                Event::Note(Note {
                    tick: 480,
                    pitch: 60,
                    velocity: 70,
                    duration: 960,
                    channel: 0,
                    name: None,
                }),
            ],
        });

        let decoded = decode(&encode(&sequence)).unwrap();

        assert_eq!(
            note_fields(&decoded),
            vec![(0, 60, 90, 960, 0), (480, 60, 70, 960, 0)]
        );
    }

    #[test]
    fn unclosed_notes_are_auto_closed() {
        env_logger::try_init().unwrap_or(());

        let track: Vec<u8> = vec![
            0x00, 0x90, 64, 100, // note on, never released
            0x83, 0x60, 0xB0, 7, 100, // cc at 480
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut bytes = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x01\xE0MTrk".to_vec();
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);

        let decoded = decode(&bytes).unwrap();
        let notes: Vec<&Note> = decoded.notes().collect();

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].duration, 480);
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(matches!(
            decode(b"RIFF\x00\x00\x00\x06\x00\x01\x00\x01\x01\xE0"),
            Err(DecodeError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode(b"MThd"),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let mut bytes = encode(&sample());
        bytes.truncate(bytes.len() - 5);

        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::TruncatedChunk { .. })
        ));
    }

    #[test]
    fn unterminated_track_is_rejected() {
        let track: Vec<u8> = vec![0x00, 0x90, 64, 100, 0x10, 0x80, 64, 0];
        let mut bytes = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x60MTrk".to_vec();
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);

        assert_eq!(decode(&bytes), Err(DecodeError::UnterminatedTrack(0)));
    }

    #[test]
    fn smpte_timing_is_rejected() {
        let mut bytes = encode(&sample());
        bytes[12] = 0xE7;
        bytes[13] = 0x28;

        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedTiming));
    }
}
