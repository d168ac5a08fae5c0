use crate::error::RangeError;
use crate::model::sequence::*;
use crate::notation::bar_start_tick;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Plain tick window, shifted so the first bar starts at 0.
    Simple,
    /// Tick window plus the state in effect at the cut, re-seeded at tick 0.
    Precise,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub sequence: Sequence,
    pub mode: ExtractionMode,
    /// Source tick where the window starts (inclusive).
    pub start_tick: Tick,
    /// Source tick where the window ends (exclusive).
    pub end_tick: Tick,
    pub warnings: Vec<String>,
}

/// Last value of each piece of device state seen before the window.
#[derive(Default)]
struct Seeds {
    tempo: Option<Tempo>,
    time_signature: Option<TimeSignature>,
    key_signature: Option<KeySignature>,
    // Keyed state remembers which track carried it so the seed goes back there.
    programs: HashMap<u8, (usize, ProgramChange)>,
    bends: HashMap<u8, (usize, PitchBend)>,
    controllers: HashMap<(u8, u8), (usize, ControlChange)>,
}

impl Seeds {
    fn collect(sequence: &Sequence, before: Tick) -> Self {
        let mut seeds = Seeds::default();

        let mut global: Vec<&Event> = sequence
            .events()
            .filter(|e| e.is_global_meta() && e.tick() < before)
            .collect();
        global.sort_by_key(|e| e.tick());

        for event in global {
            match event {
                Event::Tempo(t) => seeds.tempo = Some(*t),
                Event::TimeSignature(ts) => seeds.time_signature = Some(*ts),
                Event::KeySignature(ks) => seeds.key_signature = Some(ks.clone()),
                _ => {}
            }
        }

        for (index, track) in sequence.tracks.iter().enumerate() {
            let mut events: Vec<&Event> = track.events.iter().filter(|e| e.tick() < before).collect();
            events.sort_by_key(|e| e.tick());

            for event in events {
                match event {
                    Event::Program(p) => keep_latest(&mut seeds.programs, p.channel, index, *p, p.tick),
                    Event::PitchBend(b) => keep_latest(&mut seeds.bends, b.channel, index, *b, b.tick),
                    Event::Cc(c) => keep_latest(
                        &mut seeds.controllers,
                        (c.channel, c.controller),
                        index,
                        *c,
                        c.tick,
                    ),
                    _ => {}
                }
            }
        }

        seeds
    }

    /// Only the document-wide meta, for cuts where none of it changed before the window.
    fn opening_meta(self) -> Self {
        Seeds {
            tempo: self.tempo,
            time_signature: self.time_signature,
            key_signature: self.key_signature,
            ..Default::default()
        }
    }

    /// Place every seed at tick 0 of `out`, global meta on the first track.
    fn plant(self, out: &mut Sequence) -> usize {
        let mut planted = 0;
        let mut push = |out: &mut Sequence, index: usize, mut event: Event| {
            event.set_tick(0);
            if let Some(track) = out.tracks.get_mut(index) {
                track.events.insert(0, event);
                planted += 1;
            }
        };

        let mut programs: Vec<_> = self.programs.into_values().collect();
        programs.sort_by_key(|(_, p)| p.channel);
        let mut bends: Vec<_> = self.bends.into_values().collect();
        bends.sort_by_key(|(_, b)| b.channel);
        let mut controllers: Vec<_> = self.controllers.into_values().collect();
        controllers.sort_by_key(|(_, c)| (c.channel, c.controller));

        // Inserted at the front in reverse, so programs end up first.
        for (index, cc) in controllers.into_iter().rev() {
            push(out, index, Event::Cc(cc));
        }
        for (index, bend) in bends.into_iter().rev() {
            push(out, index, Event::PitchBend(bend));
        }
        for (index, program) in programs.into_iter().rev() {
            push(out, index, Event::Program(program));
        }
        if let Some(key) = self.key_signature {
            push(out, 0, Event::KeySignature(key));
        }
        if let Some(ts) = self.time_signature {
            push(out, 0, Event::TimeSignature(ts));
        }
        if let Some(tempo) = self.tempo {
            push(out, 0, Event::Tempo(tempo));
        }

        planted
    }
}

// Events arrive in tick order, so a tie on the same tick goes to the later one.
fn keep_latest<K, V>(map: &mut HashMap<K, (usize, V)>, key: K, index: usize, value: V, tick: Tick)
where
    K: std::hash::Hash + Eq,
    V: Copy + HasTick,
{
    match map.get(&key) {
        Some((_, existing)) if existing.at() > tick => {}
        _ => {
            map.insert(key, (index, value));
        }
    }
}

trait HasTick {
    fn at(&self) -> Tick;
}

impl HasTick for ProgramChange {
    fn at(&self) -> Tick {
        self.tick
    }
}

impl HasTick for PitchBend {
    fn at(&self) -> Tick {
        self.tick
    }
}

impl HasTick for ControlChange {
    fn at(&self) -> Tick {
        self.tick
    }
}

/// Cut the inclusive bar range `[start_bar, end_bar]` (1-based) out of `sequence`,
/// re-based so the start of `start_bar` is tick 0.
pub fn extract_range(sequence: &Sequence, start_bar: u32, end_bar: u32) -> Result<Extraction, RangeError> {
    if start_bar < 1 || end_bar < 1 {
        return Err(RangeError::NonPositiveBar {
            start: start_bar,
            end: end_bar,
        });
    }
    if start_bar > end_bar {
        return Err(RangeError::InvertedRange {
            start: start_bar,
            end: end_bar,
        });
    }

    let ppq = sequence.ppq as u32;
    let signatures = sequence.time_signatures();
    let start_tick = bar_start_tick(ppq, &signatures, start_bar);
    let end_tick = bar_start_tick(ppq, &signatures, end_bar.saturating_add(1));
    let first_bar_end = bar_start_tick(ppq, &signatures, start_bar.saturating_add(1));

    let changed = sequence
        .events()
        .any(|e| e.is_global_meta() && e.tick() > 0 && e.tick() < first_bar_end);
    let mode = if changed {
        ExtractionMode::Precise
    } else {
        ExtractionMode::Simple
    };

    debug!(
        "Extracting bars {}..={} -> ticks [{}, {}) in {:?} mode",
        start_bar, end_bar, start_tick, end_tick, mode
    );

    let mut warnings: Vec<String> = Vec::new();
    let mut out = Sequence::new(sequence.format, sequence.ppq);

    for track in sequence.tracks.iter() {
        let mut events: Vec<Event> = Vec::new();

        for event in track.events.iter() {
            let tick = event.tick();
            if tick < start_tick || tick >= end_tick {
                continue;
            }

            let mut event = event.clone();
            if let Event::Note(note) = &mut event
                && note.end_tick() > end_tick
            {
                note.duration = end_tick - note.tick;
            }
            event.set_tick(tick - start_tick);
            events.push(event);
        }

        events.sort_by_key(|e| e.tick());
        out.tracks.push(Track {
            name: track.name.clone(),
            channel: track.channel,
            events,
        });
    }

    if out.tracks.is_empty() {
        out.tracks.push(Track::default());
    }

    match mode {
        ExtractionMode::Precise => {
            let planted = Seeds::collect(sequence, start_tick).plant(&mut out);
            info!("Re-seeded {} state event(s) at the start of bar {}..!", planted, start_bar);
        }
        ExtractionMode::Simple => {
            // Meta before the window can only sit at tick 0 here, so carry it across as is.
            let carried = Seeds::collect(sequence, start_tick).opening_meta().plant(&mut out);
            if carried > 0 {
                debug!("Carried {} opening meta event(s) into the excerpt", carried);
            }

            let has_state = sequence.events().any(|e| {
                e.tick() < start_tick && matches!(e, Event::Cc(_) | Event::PitchBend(_) | Event::Program(_))
            });
            if has_state && start_tick > 0 {
                let warning = format!(
                    "No tempo, time or key change before bar {}; controller state before the cut is not re-seeded",
                    start_bar
                );
                warn!("{}..!", warning);
                warnings.push(warning);
            }
        }
    }

    if out.notes().next().is_none() {
        let warning = format!("Bars {}..={} contain no notes", start_bar, end_bar);
        warn!("{}..!", warning);
        warnings.push(warning);
    }

    Ok(Extraction {
        sequence: out,
        mode,
        start_tick,
        end_tick,
        warnings,
    })
}
