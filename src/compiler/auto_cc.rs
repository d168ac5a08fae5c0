//! Controller streams derived from the notes themselves, enabled per score through
//! `meta.autoCcPresets`.

use super::ResolvedNote;
use crate::model::sequence::{ControlChange, Tick};

const SUSTAIN: u8 = 64;
const EXPRESSION: u8 = 11;

/// One sustain bracket (127 on, 0 off) around every run of consecutive slurred notes.
pub(crate) fn sustain_from_slur(notes: &[ResolvedNote], channel: u8) -> Vec<ControlChange> {
    let mut out = Vec::new();
    let mut run: Option<(Tick, Tick)> = None;

    let close = |run: &mut Option<(Tick, Tick)>, out: &mut Vec<ControlChange>| {
        if let Some((start, end)) = run.take() {
            out.push(ControlChange {
                tick: start,
                controller: SUSTAIN,
                value: 127,
                channel,
            });
            out.push(ControlChange {
                tick: end,
                controller: SUSTAIN,
                value: 0,
                channel,
            });
        }
    };

    for note in notes.iter() {
        if !note.is_slurred() {
            close(&mut run, &mut out);
            continue;
        }

        let start = note.tick.max(0) as Tick;
        let end = start + note.duration;
        run = match run {
            Some((run_start, _)) => Some((run_start, end)),
            None => Some((start, end)),
        };
    }
    close(&mut run, &mut out);

    out
}

/// An expression (CC11) point on every onset, interpolated between the notes that
/// carry an explicit dynamic. Nothing is emitted when no note has one.
pub(crate) fn crescendo_to_expression(notes: &[ResolvedNote], channel: u8) -> Vec<ControlChange> {
    let mut anchors: Vec<(i64, u8)> = Vec::new();
    for note in notes.iter() {
        if let Some(velocity) = note.dynamic {
            match anchors.last_mut() {
                Some(last) if last.0 == note.tick => last.1 = velocity,
                _ => anchors.push((note.tick, velocity)),
            }
        }
    }

    if anchors.is_empty() {
        return Vec::new();
    }

    let mut onsets: Vec<i64> = notes.iter().map(|n| n.tick).collect();
    onsets.dedup();

    onsets
        .into_iter()
        .map(|tick| {
            let next = anchors.iter().position(|(t, _)| *t > tick);
            let value = match next {
                Some(0) => anchors[0].1 as f64,
                Some(i) => {
                    let (ta, va) = anchors[i - 1];
                    let (tb, vb) = anchors[i];
                    va as f64 + (vb as f64 - va as f64) * (tick - ta) as f64 / (tb - ta) as f64
                }
                None => anchors[anchors.len() - 1].1 as f64,
            };

            ControlChange {
                tick: tick.max(0) as Tick,
                controller: EXPRESSION,
                value: value.round().clamp(0.0, 127.0) as u8,
                channel,
            }
        })
        .collect()
}
