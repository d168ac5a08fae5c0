use crate::engine::MidiMessage;
use crate::model::sequence::{Event, Sequence};
use crate::tempo::TempoMap;
use log::{debug, warn};
use serde::Serialize;
use std::time::Duration;

/// How far past the window end a synthesized NoteOff lands.
pub const SYNTHESIZED_OFF_MS: f64 = 5.0;

/// Dispatch rank among events sharing a timestamp.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DispatchKind {
    NoteOff,
    Control,
    NoteOn,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    /// Offset from the start of playback.
    pub at_ms: f64,
    pub kind: DispatchKind,
    pub message: MidiMessage,
    /// Added at the window edge rather than taken from the document.
    pub synthesized: bool,
}

impl ScheduledEvent {
    pub fn offset(&self) -> Duration {
        Duration::from_secs_f64(self.at_ms.max(0.0) / 1000.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    pub events: Vec<ScheduledEvent>,
    pub total_duration_ms: f64,
    pub warnings: Vec<String>,
}

/// Raw expanded event plus the note it belongs to, for pairing during clipping.
struct Expanded {
    event: ScheduledEvent,
    voice: Option<usize>,
}

/// Expand a sequence into millisecond-stamped messages, optionally clipped to
/// `[start_ms, stop_ms]` and re-based so `start_ms` becomes offset 0.
pub fn build_timeline(sequence: &Sequence, start_ms: Option<f64>, stop_ms: Option<f64>) -> Timeline {
    let tempo_map = TempoMap::from_sequence(sequence);
    let mut expanded: Vec<Expanded> = Vec::new();
    let mut voice_count = 0;

    for event in sequence.events() {
        let at_ms = tempo_map.tick_to_ms(event.tick());
        let mut push = |kind: DispatchKind, at_ms: f64, message: MidiMessage, voice: Option<usize>| {
            expanded.push(Expanded {
                event: ScheduledEvent {
                    at_ms,
                    kind,
                    message,
                    synthesized: false,
                },
                voice,
            })
        };

        match event {
            Event::Note(n) => {
                let voice = Some(voice_count);
                voice_count += 1;

                push(
                    DispatchKind::NoteOn,
                    at_ms,
                    MidiMessage::NoteOn {
                        channel: n.channel,
                        pitch: n.pitch,
                        velocity: n.velocity,
                    },
                    voice,
                );
                push(
                    DispatchKind::NoteOff,
                    tempo_map.tick_to_ms(n.end_tick()),
                    MidiMessage::NoteOff {
                        channel: n.channel,
                        pitch: n.pitch,
                    },
                    voice,
                );
            }
            Event::Cc(c) => push(
                DispatchKind::Control,
                at_ms,
                MidiMessage::ControlChange {
                    channel: c.channel,
                    controller: c.controller,
                    value: c.value,
                },
                None,
            ),
            Event::Program(p) => push(
                DispatchKind::Control,
                at_ms,
                MidiMessage::ProgramChange {
                    channel: p.channel,
                    program: p.program,
                },
                None,
            ),
            Event::PitchBend(b) => push(
                DispatchKind::Control,
                at_ms,
                MidiMessage::PitchBend {
                    channel: b.channel,
                    value: b.value,
                },
                None,
            ),
            Event::Tempo(_)
            | Event::TimeSignature(_)
            | Event::KeySignature(_)
            | Event::Marker(_)
            | Event::TrackName(_) => {}
        }
    }

    expanded.sort_by(|a, b| {
        a.event
            .at_ms
            .total_cmp(&b.event.at_ms)
            .then(a.event.kind.cmp(&b.event.kind))
    });

    let mut timeline = clip(expanded, voice_count, start_ms, stop_ms);
    timeline.total_duration_ms = timeline.events.last().map(|e| e.at_ms).unwrap_or(0.0);

    debug!(
        "Built timeline with {} event(s) over {:.3}ms",
        timeline.events.len(),
        timeline.total_duration_ms
    );

    timeline
}

fn clip(expanded: Vec<Expanded>, voice_count: usize, start_ms: Option<f64>, stop_ms: Option<f64>) -> Timeline {
    let start = start_ms.unwrap_or(0.0).max(0.0);
    let stop = stop_ms.unwrap_or(f64::INFINITY);
    let inside = |at_ms: f64| at_ms >= start && at_ms <= stop;

    let mut on_kept = vec![false; voice_count];
    let mut off_kept = vec![false; voice_count];
    let mut events: Vec<ScheduledEvent> = Vec::new();
    let mut voices: Vec<Option<usize>> = Vec::new();

    for Expanded { event, voice } in expanded.into_iter() {
        if !inside(event.at_ms) {
            continue;
        }

        match (event.kind, voice) {
            (DispatchKind::NoteOn, Some(v)) => on_kept[v] = true,
            (DispatchKind::NoteOff, Some(v)) => {
                if !on_kept[v] {
                    continue;
                }
                off_kept[v] = true;
            }
            _ => {}
        }

        events.push(event);
        voices.push(voice);
    }

    let mut warnings: Vec<String> = Vec::new();
    let synthesized: Vec<ScheduledEvent> = events
        .iter()
        .zip(voices.iter())
        .filter_map(|(event, voice)| match (event.message, voice) {
            (MidiMessage::NoteOn { channel, pitch, .. }, Some(v)) if !off_kept[*v] => Some(ScheduledEvent {
                at_ms: stop + SYNTHESIZED_OFF_MS,
                kind: DispatchKind::NoteOff,
                message: MidiMessage::NoteOff { channel, pitch },
                synthesized: true,
            }),
            _ => None,
        })
        .collect();

    if !synthesized.is_empty() {
        let warning = format!(
            "Synthesized {} NoteOff event(s) at {:.3}ms for notes cut by the window end",
            synthesized.len(),
            stop + SYNTHESIZED_OFF_MS
        );
        warn!("{}..!", warning);
        warnings.push(warning);
        events.extend(synthesized);
    }

    for event in events.iter_mut() {
        event.at_ms -= start;
    }

    Timeline {
        events,
        total_duration_ms: 0.0,
        warnings,
    }
}
