use crate::model::sequence::*;
use log::{debug, warn};

const MAX_VLQ: u64 = 0x0FFF_FFFF;

// Rank of each event kind among events sharing a tick.
const ORD_META: u8 = 0;
const ORD_PROGRAM: u8 = 1;
const ORD_CONTROL: u8 = 2;
const ORD_BEND: u8 = 3;
const ORD_NOTE_OFF: u8 = 4;
const ORD_NOTE_ON: u8 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Write this container format instead of the sequence's own (0 or 1).
    pub format: Option<u16>,
}

struct RawEvent {
    tick: Tick,
    ord: u8,
    bytes: Vec<u8>,
}

/// Serialize a sequence into Standard MIDI File bytes, using its own format.
pub fn encode(sequence: &Sequence) -> Vec<u8> {
    encode_with(sequence, &EncodeOptions::default())
}

pub fn encode_with(sequence: &Sequence, options: &EncodeOptions) -> Vec<u8> {
    let mut sequence = sequence.clone();
    sequence.normalize();

    let format = options.format.unwrap_or(sequence.format).min(1);
    let track_count = sequence.tracks.len().max(1);

    let mut blocks: Vec<Vec<RawEvent>> = if format == 0 {
        vec![Vec::new()]
    } else {
        (0..track_count).map(|_| Vec::new()).collect()
    };

    for (index, track) in sequence.tracks.iter().enumerate() {
        let own_block = if format == 0 { 0 } else { index };

        if let Some(name) = &track.name
            && (format == 1 || index == 0)
        {
            blocks[own_block].push(RawEvent {
                tick: 0,
                ord: ORD_META,
                bytes: text_meta(0x03, name),
            });
        }

        for event in track.events.iter() {
            let block = if event.is_global_meta() { 0 } else { own_block };
            push_event(&mut blocks[block], event);
        }
    }

    let tracks: Vec<Vec<u8>> = blocks
        .into_iter()
        .map(|mut events| {
            events.sort_by_key(|e| (e.tick, e.ord));
            build_track(&events)
        })
        .collect();

    debug!(
        "Encoded format {} file with {} track block(s) at {} ppq",
        format,
        tracks.len(),
        sequence.ppq
    );

    build_midi_file(format, sequence.ppq, &tracks)
}

fn push_event(block: &mut Vec<RawEvent>, event: &Event) {
    let mut push = |tick: Tick, ord: u8, bytes: Vec<u8>| block.push(RawEvent { tick, ord, bytes });

    match event {
        Event::Note(n) => {
            push(n.tick, ORD_NOTE_ON, vec![0x90 | n.channel, n.pitch, n.velocity]);
            push(n.end_tick(), ORD_NOTE_OFF, vec![0x80 | n.channel, n.pitch, 0]);
        }
        Event::Cc(c) => push(c.tick, ORD_CONTROL, vec![0xB0 | c.channel, c.controller, c.value]),
        Event::Program(p) => push(p.tick, ORD_PROGRAM, vec![0xC0 | p.channel, p.program]),
        Event::PitchBend(b) => {
            let raw = (b.value as i32 + 0x2000).clamp(0, 0x3FFF) as u16;
            push(
                b.tick,
                ORD_BEND,
                vec![0xE0 | b.channel, (raw & 0x7F) as u8, (raw >> 7) as u8],
            );
        }
        Event::Tempo(t) => {
            let us = t.us_per_quarter;
            push(
                t.tick,
                ORD_META,
                vec![0xFF, 0x51, 0x03, (us >> 16) as u8, (us >> 8) as u8, us as u8],
            );
        }
        Event::TimeSignature(ts) => {
            let denominator_pow = ts.denominator.max(1).trailing_zeros() as u8;
            push(
                ts.tick,
                ORD_META,
                vec![0xFF, 0x58, 0x04, ts.numerator, denominator_pow, 0x18, 0x08],
            );
        }
        Event::KeySignature(ks) => {
            push(ks.tick, ORD_META, vec![0xFF, 0x59, 0x02, ks.sf as u8, ks.mi]);
        }
        Event::Marker(m) => push(m.tick, ORD_META, text_meta(0x06, &m.text)),
        Event::TrackName(m) => push(m.tick, ORD_META, text_meta(0x03, &m.text)),
    }
}

fn text_meta(kind: u8, text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, kind];
    write_vlq(&mut bytes, text.len() as u64);
    bytes.extend_from_slice(text.as_bytes());

    bytes
}

fn build_track(events: &[RawEvent]) -> Vec<u8> {
    let mut track_data = Vec::new();
    let mut last_tick: Tick = 0;

    for event in events.iter() {
        let delta = event.tick.saturating_sub(last_tick);
        write_vlq(&mut track_data, delta);
        track_data.extend_from_slice(&event.bytes);
        last_tick = event.tick;
    }

    // End of track
    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    track_data
}

fn build_midi_file(format: u16, ppq: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();

    // MThd header
    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&format.to_be_bytes());
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&(ppq & 0x7FFF).to_be_bytes());

    // MTrk chunks
    for track_data in tracks {
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(track_data);
    }

    buf
}

/// Big-endian base-128 with the continuation bit on every byte but the last.
pub(crate) fn write_vlq(buf: &mut Vec<u8>, value: u64) {
    let mut value = if value > MAX_VLQ {
        warn!("Value {} exceeds the 28-bit VLQ limit, saturating..!", value);
        MAX_VLQ
    } else {
        value
    };

    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buf.extend_from_slice(&bytes);
}

#[cfg(test)]
mod test {
    use super::*;
    use midly::Smf;
    use pretty_assertions::assert_eq;

    fn note(tick: Tick, pitch: u8, duration: Tick) -> Event {
        Event::Note(Note {
            tick,
            pitch,
            velocity: 100,
            duration,
            channel: 0,
            name: None,
        })
    }

    #[test]
    fn vlq_encoding() {
        let cases: [(u64, &[u8]); 6] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x81, 0x00]),
            (480, &[0x83, 0x60]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];

        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_vlq(&mut buf, value);
            assert_eq!(buf, expected.to_vec());
        }
    }

    #[test]
    fn exact_bytes_for_a_single_note() {
        let mut sequence = Sequence::new(1, 480);
        sequence.tracks.push(Track {
            name: None,
            channel: Some(0),
            events: vec![
                Event::Tempo(Tempo {
                    tick: 0,
                    us_per_quarter: 500_000,
                }),
                note(0, 60, 480),
            ],
        });

        let bytes = encode(&sequence);
        let parts: [&[u8]; 8] = [
            b"MThd",
            &[0, 0, 0, 6, 0, 1, 0, 1, 0x01, 0xE0],
            b"MTrk",
            &[0, 0, 0, 20],
            &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20],
            &[0x00, 0x90, 60, 100],
            &[0x83, 0x60, 0x80, 60, 0],
            &[0x00, 0xFF, 0x2F, 0x00],
        ];

        assert_eq!(bytes, parts.concat());
    }

    #[test]
    fn note_off_precedes_note_on_at_same_tick() {
        let mut sequence = Sequence::new(1, 480);
        sequence.tracks.push(Track {
            name: None,
            channel: Some(0),
            events: vec![note(0, 60, 480), note(480, 60, 480)],
        });

        let bytes = encode(&sequence);
        let smf = Smf::parse(&bytes).unwrap();

        let mut tick = 0;
        let mut at_480 = Vec::new();
        for event in smf.tracks[0].iter() {
            tick += event.delta.as_int();
            if tick == 480
                && let midly::TrackEventKind::Midi { message, .. } = event.kind
            {
                at_480.push(message);
            }
        }

        assert!(matches!(at_480[0], midly::MidiMessage::NoteOff { .. }));
        assert!(matches!(at_480[1], midly::MidiMessage::NoteOn { .. }));
    }

    #[test]
    fn format_one_homes_global_meta_to_first_block() {
        let mut sequence = Sequence::new(1, 96);
        sequence.tracks.push(Track {
            name: Some(String::from("Conductor")),
            channel: None,
            events: vec![],
        });
        sequence.tracks.push(Track {
            name: Some(String::from("Bass")),
            channel: Some(1),
            events: vec![
                Event::Tempo(Tempo {
                    tick: 96,
                    us_per_quarter: 600_000,
                }),
                Event::Program(ProgramChange {
                    tick: 0,
                    program: 33,
                    channel: 1,
                }),
            ],
        });

        let bytes = encode(&sequence);
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, midly::Format::Parallel);
        assert_eq!(smf.tracks.len(), 2);

        let has_tempo = |track: &Vec<midly::TrackEvent>| {
            track.iter().any(|e| {
                matches!(
                    e.kind,
                    midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(_))
                )
            })
        };
        assert!(has_tempo(&smf.tracks[0]));
        assert!(!has_tempo(&smf.tracks[1]));
    }

    #[test]
    fn format_zero_merges_into_one_block() {
        let mut sequence = Sequence::new(1, 480);
        for channel in 0..3u8 {
            sequence.tracks.push(Track {
                name: None,
                channel: Some(channel),
                events: vec![Event::Note(Note {
                    tick: channel as Tick * 10,
                    pitch: 60 + channel,
                    velocity: 90,
                    duration: 100,
                    channel,
                    name: None,
                })],
            });
        }

        let bytes = encode_with(&sequence, &EncodeOptions { format: Some(0) });
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(smf.header.format, midly::Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
        // 3 notes on + 3 notes off + end of track
        assert_eq!(smf.tracks[0].len(), 7);
    }

    #[test]
    fn pitch_bend_splits_into_seven_bit_halves() {
        let mut block = Vec::new();
        push_event(
            &mut block,
            &Event::PitchBend(PitchBend {
                tick: 0,
                value: -8192,
                channel: 2,
            }),
        );
        push_event(
            &mut block,
            &Event::PitchBend(PitchBend {
                tick: 0,
                value: 8191,
                channel: 2,
            }),
        );
        push_event(
            &mut block,
            &Event::PitchBend(PitchBend {
                tick: 0,
                value: 0,
                channel: 2,
            }),
        );

        assert_eq!(block[0].bytes, vec![0xE2, 0x00, 0x00]);
        assert_eq!(block[1].bytes, vec![0xE2, 0x7F, 0x7F]);
        assert_eq!(block[2].bytes, vec![0xE2, 0x00, 0x40]);
    }
}
