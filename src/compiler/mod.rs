//! Score -> canonical sequence.
//!
//! Compilation happens in two passes. `resolve` checks the whole score and produces
//! a fully populated `ResolvedScore` (numeric pitches, tick positions, tick lengths,
//! final velocities), collecting every problem it finds. Only a score that resolves
//! cleanly reaches `build`, so a failed compile never yields partial output.

mod auto_cc;

use crate::error::CompileError;
use crate::model::score::*;
use crate::model::sequence::*;
use crate::notation::*;
use log::{debug, info, warn};

const MIN_LEGATO_OVERLAP: Tick = 5;

#[derive(Debug, Clone)]
struct ResolvedScore {
    ppq: u32,
    numerator: u8,
    denominator: u8,
    key: (i8, u8),
    tempos: Vec<(i64, u32)>,
    title: Option<String>,
    presets: Vec<AutoCcPreset>,
    tracks: Vec<ResolvedTrack>,
}

#[derive(Debug, Clone)]
struct ResolvedTrack {
    name: Option<String>,
    channel: u8,
    program: u8,
    notes: Vec<ResolvedNote>,
    others: Vec<(i64, Event)>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedNote {
    pub tick: i64,
    pub pitch: u8,
    pub velocity: u8,
    pub duration: Tick,
    pub articulation: Option<Articulation>,
    /// Velocity of an explicit dynamic marking on this note.
    pub dynamic: Option<u8>,
    pub tie: bool,
    pub slur: bool,
}

impl ResolvedNote {
    pub(crate) fn is_slurred(&self) -> bool {
        self.slur || matches!(self.articulation, Some(Articulation::Legato | Articulation::Slur))
    }
}

/// Compile a score into a format-1 canonical sequence.
pub fn compile(score: &Score) -> Result<Sequence, CompileError> {
    let resolved = resolve(score)?;
    let sequence = build(resolved);

    info!(
        "Compiled score into {} track(s) with {} note(s)..!",
        sequence.tracks.len(),
        sequence.notes().count()
    );

    Ok(sequence)
}

/// Parse and compile a JSON score document.
pub fn compile_json(json: &str) -> Result<Sequence, CompileError> {
    compile(&Score::from_json(json)?)
}

struct Resolver {
    ppq: u32,
    numerator: u8,
    denominator: u8,
    errors: Vec<CompileError>,
    has_pickup: bool,
}

impl Resolver {
    fn schema(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(CompileError::Schema {
            path: path.into(),
            message: message.into(),
        });
    }

    fn tick(&mut self, path: &str, position: &Position) -> Option<i64> {
        if position.beat == 0 {
            self.schema(path, "beat is 1-based and must be at least 1");
            return None;
        }

        if position.offset.is_some() && position.unit.unwrap_or(0) == 0 {
            self.schema(path, "offset needs a non-zero unit");
            return None;
        }

        if position.bar == 0 {
            self.has_pickup = true;
        }

        Some(position_to_tick(
            self.ppq,
            self.numerator,
            self.denominator,
            position,
        ))
    }

    fn duration(&mut self, path: &str, spec: &NoteSpec) -> Option<Tick> {
        let base = match &spec.duration {
            DurationValue::Token(token) => match token.parse::<NoteValue>() {
                Ok(value) => BaseDuration::Value(value),
                Err(_) => {
                    self.errors.push(CompileError::InvalidDuration {
                        path: path.to_string(),
                        token: token.clone(),
                    });
                    return None;
                }
            },
            DurationValue::Ratio {
                numerator,
                denominator,
            } => {
                if *numerator == 0 || *denominator == 0 {
                    self.errors.push(CompileError::InvalidDuration {
                        path: path.to_string(),
                        token: format!("{}/{}", numerator, denominator),
                    });
                    return None;
                }
                BaseDuration::Ratio {
                    numerator: *numerator,
                    denominator: *denominator,
                }
            }
        };

        if spec.dots > 2 {
            self.schema(path, format!("at most 2 dots are supported, got {}", spec.dots));
            return None;
        }

        let tuplet = match spec.tuplet {
            Some(t) if t.in_space_of == 0 || t.play == 0 => {
                self.schema(path, "tuplet counts must be positive");
                return None;
            }
            Some(t) => Some((t.in_space_of, t.play)),
            None => None,
        };

        Some(duration_ticks(self.ppq, base, spec.dots, tuplet))
    }

    fn note(&mut self, path: &str, spec: &NoteSpec) -> Option<ResolvedNote> {
        let pitch = match &spec.pitch {
            PitchSpec::Number(n) => Some((*n).clamp(0, 127) as u8),
            PitchSpec::Name(name) => {
                let pitch = note_name_to_pitch(name);
                if pitch.is_none() {
                    self.errors.push(CompileError::UnresolvedPitch {
                        path: format!("{}.pitch", path),
                        name: name.clone(),
                    });
                }
                pitch
            }
        };

        let dynamic = match &spec.dynamic {
            Some(mark) => {
                let velocity = dynamic_velocity(mark);
                if velocity.is_none() {
                    self.schema(format!("{}.dynamic", path), format!("unknown dynamic '{}'", mark));
                }
                velocity
            }
            None => None,
        };

        let tick = self.tick(&format!("{}.start", path), &spec.start);
        let duration = self.duration(&format!("{}.duration", path), spec);

        let mut velocity = spec
            .velocity
            .or(dynamic.map(i64::from))
            .unwrap_or(DEFAULT_VELOCITY as i64);
        match spec.articulation {
            Some(Articulation::Accent) => velocity += ACCENT_BOOST,
            Some(Articulation::Marcato) => velocity += MARCATO_BOOST,
            _ => {}
        }

        Some(ResolvedNote {
            tick: tick?,
            pitch: pitch?,
            velocity: velocity.clamp(1, 127) as u8,
            duration: duration?,
            articulation: spec.articulation,
            dynamic,
            tie: spec.tie,
            slur: spec.slur,
        })
    }

    fn track(&mut self, index: usize, track: &ScoreTrack) -> ResolvedTrack {
        if track.channel > 15 {
            warn!("Track {} channel {} clamped to 15..!", index, track.channel);
        }
        if track.program > 127 {
            warn!("Track {} program {} clamped to 127..!", index, track.program);
        }

        let channel = track.channel.min(15);
        let mut resolved = ResolvedTrack {
            name: track.name.clone(),
            channel,
            program: track.program.min(127),
            notes: Vec::new(),
            others: Vec::new(),
        };

        for (i, event) in track.events.iter().enumerate() {
            let path = format!("tracks[{}].events[{}]", index, i);

            match event {
                ScoreEvent::Note(spec) => {
                    if let Some(note) = self.note(&path, spec) {
                        resolved.notes.push(note);
                    }
                }
                ScoreEvent::Marker(spec) | ScoreEvent::TrackName(spec) => {
                    if let Some(tick) = self.tick(&format!("{}.at", path), &spec.at) {
                        let text = Text {
                            tick: 0,
                            text: spec.text.clone(),
                        };
                        let event = if matches!(event, ScoreEvent::Marker(_)) {
                            Event::Marker(text)
                        } else {
                            Event::TrackName(text)
                        };
                        resolved.others.push((tick, event));
                    }
                }
                ScoreEvent::Cc(spec) => {
                    if spec.controller > 127 {
                        self.schema(format!("{}.controller", path), "controller must be 0..=127");
                        continue;
                    }
                    if let Some(tick) = self.tick(&format!("{}.at", path), &spec.at) {
                        resolved.others.push((
                            tick,
                            Event::Cc(ControlChange {
                                tick: 0,
                                controller: spec.controller,
                                value: spec.value.clamp(0, 127) as u8,
                                channel,
                            }),
                        ));
                    }
                }
                ScoreEvent::PitchBend(spec) => {
                    if let Some(tick) = self.tick(&format!("{}.at", path), &spec.at) {
                        resolved.others.push((
                            tick,
                            Event::PitchBend(PitchBend {
                                tick: 0,
                                value: spec.value.clamp(-8192, 8191) as i16,
                                channel,
                            }),
                        ));
                    }
                }
            }
        }

        resolved
    }
}

fn parse_time_signature(spec: &TimeSignatureSpec) -> Option<(u8, u8)> {
    let (numerator, denominator) = match spec {
        TimeSignatureSpec::Parts {
            numerator,
            denominator,
        } => (*numerator, *denominator),
        TimeSignatureSpec::Text(text) => {
            let (n, d) = text.split_once('/')?;
            (n.trim().parse().ok()?, d.trim().parse().ok()?)
        }
    };

    if numerator == 0 || ![1, 2, 4, 8, 16, 32].contains(&denominator) {
        return None;
    }

    Some((numerator, denominator))
}

fn bpm_to_us(bpm: f64) -> Option<u32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }

    Some(((60_000_000.0 / bpm).round() as u32).clamp(1, 0xFF_FFFF))
}

fn resolve(score: &Score) -> Result<ResolvedScore, CompileError> {
    if !(MIN_PPQ as u32..=MAX_PPQ as u32).contains(&score.ppq) {
        return Err(CompileError::InvalidPpq(score.ppq));
    }

    let mut errors: Vec<CompileError> = Vec::new();

    let (numerator, denominator) = match &score.meta.time_signature {
        None => {
            errors.push(CompileError::MissingMeta("timeSignature"));
            (4, 4)
        }
        Some(spec) => parse_time_signature(spec).unwrap_or_else(|| {
            errors.push(CompileError::Schema {
                path: String::from("meta.timeSignature"),
                message: format!("{:?} is not a valid time signature", spec),
            });
            (4, 4)
        }),
    };

    let key = match &score.meta.key_signature {
        None => (0, 0),
        Some(name) => key_signature_from_name(name).unwrap_or_else(|| {
            errors.push(CompileError::Schema {
                path: String::from("meta.keySignature"),
                message: format!("unknown key '{}'", name),
            });
            (0, 0)
        }),
    };

    let mut resolver = Resolver {
        ppq: score.ppq,
        numerator,
        denominator,
        errors,
        has_pickup: false,
    };

    let mut tempos: Vec<(i64, u32)> = Vec::new();
    match &score.meta.tempo {
        None => resolver.errors.push(CompileError::MissingMeta("tempo")),
        Some(TempoSpec::Fixed(bpm)) => match bpm_to_us(*bpm) {
            Some(us) => tempos.push((0, us)),
            None => resolver.schema("meta.tempo", format!("{} is not a valid bpm", bpm)),
        },
        Some(TempoSpec::Changes(changes)) => {
            if changes.is_empty() {
                resolver.errors.push(CompileError::MissingMeta("tempo"));
            }

            for (i, change) in changes.iter().enumerate() {
                let path = format!("meta.tempo[{}]", i);
                let tick = resolver.tick(&path, &Position::new(change.bar, change.beat));

                match (tick, bpm_to_us(change.bpm)) {
                    (Some(tick), Some(us)) => tempos.push((tick, us)),
                    (_, None) => {
                        resolver.schema(path, format!("{} is not a valid bpm", change.bpm))
                    }
                    _ => {}
                }
            }
        }
    }

    let tracks: Vec<ResolvedTrack> = score
        .tracks
        .iter()
        .enumerate()
        .map(|(i, track)| resolver.track(i, track))
        .collect();

    let mut errors = resolver.errors;
    match errors.len() {
        0 => {}
        1 => return Err(errors.remove(0)),
        _ => return Err(CompileError::Invalid(errors)),
    }

    let mut resolved = ResolvedScore {
        ppq: score.ppq,
        numerator,
        denominator,
        key,
        tempos,
        title: score.meta.title.clone(),
        presets: score.meta.auto_cc_presets.clone(),
        tracks,
    };

    if resolver.has_pickup {
        shift_for_pickup(&mut resolved);
    }

    Ok(resolved)
}

/// A bar-0 pickup sits before tick 0; push everything one bar later so the pickup
/// bar occupies the first bar's span.
fn shift_for_pickup(score: &mut ResolvedScore) {
    let shift = bar_ticks(score.ppq, score.numerator, score.denominator).round() as i64;
    debug!("Pickup bar present, shifting score by {} ticks", shift);

    for (tick, _) in score.tempos.iter_mut() {
        *tick += shift;
    }

    // The opening tempo still has to govern the pickup.
    if let Some(first) = score.tempos.iter_mut().min_by_key(|(tick, _)| *tick)
        && first.0 == shift
    {
        first.0 = 0;
    }

    for track in score.tracks.iter_mut() {
        for note in track.notes.iter_mut() {
            note.tick += shift;
        }
        for (tick, _) in track.others.iter_mut() {
            *tick += shift;
        }
    }
}

fn to_tick(tick: i64) -> Tick {
    tick.max(0) as Tick
}

/// Absorb tied notes into the preceding note of the same pitch. Notes must be sorted
/// by (tick, pitch).
fn merge_ties(notes: Vec<ResolvedNote>) -> Vec<ResolvedNote> {
    let mut merged: Vec<ResolvedNote> = Vec::with_capacity(notes.len());

    for note in notes.into_iter() {
        if note.tie
            && let Some(prev) = merged.iter_mut().rev().find(|n| n.pitch == note.pitch)
        {
            let prev_end = prev.tick + prev.duration as i64;

            if note.tick <= prev_end + 1 {
                let end = prev_end.max(note.tick + note.duration as i64);
                prev.duration = (end - prev.tick).max(1) as Tick;
                prev.slur |= note.slur;
                debug!(
                    "Tied pitch {} at tick {} into note at tick {}",
                    note.pitch, note.tick, prev.tick
                );
                continue;
            }
        }

        merged.push(note);
    }

    merged
}

/// Apply articulation length changes, keeping each changed note clear of the next onset.
fn apply_articulations(notes: &mut [ResolvedNote]) {
    for i in 0..notes.len() {
        let original = notes[i].duration;
        let duration = original as f64;

        let adjusted = match notes[i].articulation {
            Some(Articulation::Staccato) => (duration * 0.5).round() as Tick,
            Some(Articulation::Tenuto) => (duration * 1.05).round() as Tick,
            Some(Articulation::Legato | Articulation::Slur) => {
                original + MIN_LEGATO_OVERLAP.max((duration * 0.1).round() as Tick)
            }
            _ if notes[i].slur => original + MIN_LEGATO_OVERLAP.max((duration * 0.1).round() as Tick),
            _ => continue,
        };

        let start = notes[i].tick;
        let mut adjusted = adjusted.max(1);

        if let Some(next_start) = notes[i + 1..].iter().map(|n| n.tick).find(|t| *t > start) {
            let limit = (next_start - 1 - start).max(1) as Tick;
            adjusted = adjusted.min(limit);
        }

        notes[i].duration = adjusted;
    }
}

fn build(score: ResolvedScore) -> Sequence {
    let mut sequence = Sequence::new(1, score.ppq as u16);

    for (index, track) in score.tracks.into_iter().enumerate() {
        let ResolvedTrack {
            name,
            channel,
            program,
            mut notes,
            others,
        } = track;

        notes.sort_by_key(|n| (n.tick, n.pitch));
        let mut notes = merge_ties(notes);
        apply_articulations(&mut notes);

        let mut events: Vec<Event> = vec![Event::Program(ProgramChange {
            tick: 0,
            program,
            channel,
        })];

        for (tick, mut event) in others.into_iter() {
            event.set_tick(to_tick(tick));
            events.push(event);
        }

        for preset in score.presets.iter() {
            let controls = match preset {
                AutoCcPreset::SustainFromSlur => auto_cc::sustain_from_slur(&notes, channel),
                AutoCcPreset::CrescendoToExpression => {
                    auto_cc::crescendo_to_expression(&notes, channel)
                }
            };
            debug!(
                "Preset {:?} emitted {} controller event(s) on track {}",
                preset,
                controls.len(),
                index
            );
            events.extend(controls.into_iter().map(Event::Cc));
        }

        events.extend(notes.iter().map(|n| {
            Event::Note(Note {
                tick: to_tick(n.tick),
                pitch: n.pitch,
                velocity: n.velocity,
                duration: n.duration,
                channel,
                name: None,
            })
        }));

        events.sort_by_key(|e| e.tick());

        sequence.tracks.push(Track {
            name,
            channel: Some(channel),
            events,
        });
    }

    if sequence.tracks.is_empty() {
        sequence.tracks.push(Track::default());
    }

    let mut global: Vec<Event> = vec![
        Event::TimeSignature(TimeSignature {
            tick: 0,
            numerator: score.numerator,
            denominator: score.denominator,
        }),
        Event::KeySignature(KeySignature {
            tick: 0,
            sf: score.key.0,
            mi: score.key.1,
            key: None,
        }),
    ];
    global.extend(score.tempos.iter().map(|(tick, us)| {
        Event::Tempo(Tempo {
            tick: to_tick(*tick),
            us_per_quarter: *us,
        })
    }));

    let first = &mut sequence.tracks[0];
    if first.name.is_none() {
        first.name = score.title;
    }

    global.append(&mut first.events);
    global.sort_by_key(|e| e.tick());
    first.events = global;

    sequence
}

#[cfg(test)]
mod test {
    use super::*;

    fn score_with_notes(notes: &str) -> String {
        format!(
            r#"{{
                "ppq": 480,
                "meta": {{ "timeSignature": "4/4", "keySignature": "C", "tempo": 120 }},
                "tracks": [{{ "channel": 0, "program": 0, "events": [{}] }}]
            }}"#,
            notes
        )
    }

    fn notes_of(sequence: &Sequence) -> Vec<Note> {
        sequence.notes().cloned().collect()
    }

    #[test]
    fn single_quarter_note() {
        env_logger::try_init().unwrap_or(());

        let json = score_with_notes(
            r#"{ "type": "note", "pitch": "C4", "start": { "bar": 1, "beat": 1 }, "duration": "quarter" }"#,
        );
        let sequence = compile_json(&json).unwrap();
        let notes = notes_of(&sequence);

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].tick, 0);
        assert_eq!(notes[0].duration, 480);
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[0].velocity, 80);
    }

    #[test]
    fn staccato_and_tenuto_lengths() {
        let staccato = compile_json(&score_with_notes(
            r#"{ "type": "note", "pitch": "C4", "start": { "bar": 1 }, "duration": "quarter", "articulation": "staccato" }"#,
        ))
        .unwrap();
        let tenuto = compile_json(&score_with_notes(
            r#"{ "type": "note", "pitch": "C4", "start": { "bar": 1 }, "duration": "quarter", "articulation": "tenuto" }"#,
        ))
        .unwrap();

        assert_eq!(notes_of(&staccato)[0].duration, 240);
        assert_eq!(notes_of(&tenuto)[0].duration, 504);
    }

    #[test]
    fn ties_merge_into_one_note() {
        let json = score_with_notes(
            r#"{ "type": "note", "pitch": "E4", "start": { "bar": 1, "beat": 1 }, "duration": "half" },
               { "type": "note", "pitch": "E4", "start": { "bar": 1, "beat": 3 }, "duration": "quarter", "tie": true },
               { "type": "note", "pitch": "G4", "start": { "bar": 1, "beat": 4 }, "duration": "quarter", "tie": true }"#,
        );
        let notes = notes_of(&compile_json(&json).unwrap());

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].pitch, 64);
        assert_eq!(notes[0].tick, 0);
        assert_eq!(notes[0].duration, 1440);
        assert_eq!(notes[1].pitch, 67);
    }

    #[test]
    fn tie_with_a_gap_is_not_merged() {
        let json = score_with_notes(
            r#"{ "type": "note", "pitch": "E4", "start": { "bar": 1, "beat": 1 }, "duration": "quarter" },
               { "type": "note", "pitch": "E4", "start": { "bar": 1, "beat": 3 }, "duration": "quarter", "tie": true }"#,
        );

        assert_eq!(notes_of(&compile_json(&json).unwrap()).len(), 2);
    }

    #[test]
    fn legato_is_clipped_before_next_onset() {
        let json = score_with_notes(
            r#"{ "type": "note", "pitch": "C4", "start": { "bar": 1, "beat": 1 }, "duration": "quarter", "articulation": "legato" },
               { "type": "note", "pitch": "D4", "start": { "bar": 1, "beat": 2 }, "duration": "quarter", "articulation": "legato" },
               { "type": "note", "pitch": "E4", "start": { "bar": 2, "beat": 1 }, "duration": "quarter", "articulation": "legato" }"#,
        );
        let notes = notes_of(&compile_json(&json).unwrap());

        assert_eq!(notes[0].duration, 479);
        assert!(notes[0].end_tick() <= notes[1].tick - 1);
        // Room to grow before the next bar: 480 + max(5, 48).
        assert_eq!(notes[1].duration, 528);
        assert_eq!(notes[2].duration, 528);
    }

    #[test]
    fn dynamics_and_accents_shape_velocity() {
        let json = score_with_notes(
            r#"{ "type": "note", "pitch": 60, "start": { "bar": 1 }, "duration": "quarter", "dynamic": "pp" },
               { "type": "note", "pitch": 62, "start": { "bar": 1, "beat": 2 }, "duration": "quarter", "dynamic": "ff", "articulation": "marcato" },
               { "type": "note", "pitch": 64, "start": { "bar": 1, "beat": 3 }, "duration": "quarter", "velocity": 100, "articulation": "accent" },
               { "type": "note", "pitch": 300, "start": { "bar": 1, "beat": 4 }, "duration": "quarter", "velocity": 0 }"#,
        );
        let notes = notes_of(&compile_json(&json).unwrap());

        assert_eq!(notes[0].velocity, 32);
        assert_eq!(notes[1].velocity, 127);
        assert_eq!(notes[2].velocity, 115);
        assert_eq!(notes[3].velocity, 1);
        assert_eq!(notes[3].pitch, 127);
    }

    #[test]
    fn global_meta_lands_in_first_track() {
        let json = r#"{
            "ppq": 480,
            "meta": {
                "timeSignature": { "numerator": 3, "denominator": 4 },
                "keySignature": "Eb",
                "tempo": [{ "bar": 1, "bpm": 120 }, { "bar": 3, "bpm": 60 }],
                "title": "Waltz"
            },
            "tracks": [
                { "channel": 0, "events": [] },
                { "channel": 9, "program": 12, "events": [
                    { "type": "note", "pitch": 36, "start": { "bar": 2 }, "duration": "quarter" }
                ] }
            ]
        }"#;

        let sequence = compile_json(json).unwrap();
        assert_eq!(sequence.tracks.len(), 2);
        assert_eq!(sequence.tracks[0].name.as_deref(), Some("Waltz"));
        assert_eq!(sequence.tempo_changes(), vec![(0, 500_000), (2880, 1_000_000)]);
        assert!(sequence.tracks[1].events.iter().all(|e| !e.is_global_meta()));
        assert!(sequence.tracks[0].events.iter().any(|e| matches!(
            e,
            Event::KeySignature(KeySignature { sf: -3, mi: 0, .. })
        )));

        let Some(Note { tick, channel, .. }) = sequence.notes().next() else {
            panic!("expected a note");
        };
        assert_eq!(*tick, 1440);
        assert_eq!(*channel, 9);
    }

    #[test]
    fn pickup_bar_shifts_everything() {
        let json = score_with_notes(
            r#"{ "type": "note", "pitch": "G3", "start": { "bar": 0, "beat": 4 }, "duration": "quarter" },
               { "type": "note", "pitch": "C4", "start": { "bar": 1, "beat": 1 }, "duration": "quarter" }"#,
        );
        let sequence = compile_json(&json).unwrap();
        let notes = notes_of(&sequence);

        assert_eq!(notes[0].tick, 1440);
        assert_eq!(notes[1].tick, 1920);
        assert_eq!(sequence.tempo_changes(), vec![(0, 500_000)]);
    }

    #[test]
    fn every_problem_is_reported() {
        let json = r#"{
            "ppq": 480,
            "meta": { "keySignature": "C" },
            "tracks": [{ "events": [
                { "type": "note", "pitch": "H9", "start": { "bar": 1 }, "duration": "quarter" },
                { "type": "note", "pitch": "C4", "start": { "bar": 1 }, "duration": "breve" }
            ] }]
        }"#;

        let Err(CompileError::Invalid(errors)) = compile_json(json) else {
            panic!("expected an aggregated compile error");
        };

        assert!(errors.contains(&CompileError::MissingMeta("timeSignature")));
        assert!(errors.contains(&CompileError::MissingMeta("tempo")));
        assert!(errors.iter().any(|e| matches!(e, CompileError::UnresolvedPitch { name, .. } if name == "H9")));
        assert!(errors.iter().any(|e| matches!(e, CompileError::InvalidDuration { token, .. } if token == "breve")));
    }

    #[test]
    fn ppq_out_of_range_is_rejected() {
        let json = r#"{ "ppq": 12, "meta": { "timeSignature": "4/4", "tempo": 100 }, "tracks": [] }"#;
        assert_eq!(compile_json(json), Err(CompileError::InvalidPpq(12)));
    }
}
