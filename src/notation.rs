//! Tick arithmetic and the notation lookup tables: positions, note values,
//! note names, dynamics and key signatures.

use crate::model::score::Position;
use crate::model::sequence::{Tick, TimeSignature};
use std::str::FromStr;

pub const DEFAULT_VELOCITY: u8 = 80;
pub const ACCENT_BOOST: i64 = 15;
pub const MARCATO_BOOST: i64 = 25;

const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];
const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl NoteValue {
    /// Length in quarter notes.
    pub fn quarters(self) -> f64 {
        match self {
            NoteValue::Whole => 4.0,
            NoteValue::Half => 2.0,
            NoteValue::Quarter => 1.0,
            NoteValue::Eighth => 0.5,
            NoteValue::Sixteenth => 0.25,
            NoteValue::ThirtySecond => 0.125,
        }
    }
}

impl FromStr for NoteValue {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whole" | "1" => Ok(NoteValue::Whole),
            "half" | "2" => Ok(NoteValue::Half),
            "quarter" | "4" => Ok(NoteValue::Quarter),
            "eighth" | "8" | "8th" => Ok(NoteValue::Eighth),
            "sixteenth" | "16" | "16th" => Ok(NoteValue::Sixteenth),
            "thirty-second" | "thirty_second" | "thirtysecond" | "32" | "32nd" => {
                Ok(NoteValue::ThirtySecond)
            }
            _ => Err(()),
        }
    }
}

/// The undotted, untupled length of a note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaseDuration {
    Value(NoteValue),
    /// A fraction of a whole note.
    Ratio { numerator: u32, denominator: u32 },
}

/// Ticks in one beat of a meter whose beat unit is `1/denominator`.
pub fn beat_ticks(ppq: u32, denominator: u8) -> f64 {
    ppq as f64 * 4.0 / denominator as f64
}

pub fn bar_ticks(ppq: u32, numerator: u8, denominator: u8) -> f64 {
    beat_ticks(ppq, denominator) * numerator as f64
}

/// Absolute tick of a bar/beat position. Signed because bar 0 (a pickup) lands
/// before tick 0.
pub fn position_to_tick(ppq: u32, numerator: u8, denominator: u8, position: &Position) -> i64 {
    let beat = beat_ticks(ppq, denominator);
    let bar = beat * numerator as f64;

    let sub_beat = match (position.unit, position.offset) {
        (Some(unit), Some(offset)) if unit > 0 && offset > 0 => {
            (beat / unit as f64 * offset as f64).round()
        }
        _ => 0.0,
    };

    let tick = (position.bar as f64 - 1.0) * bar + (position.beat as f64 - 1.0) * beat + sub_beat;
    tick.round() as i64
}

/// Length in ticks, never shorter than one tick.
pub fn duration_ticks(
    ppq: u32,
    base: BaseDuration,
    dots: u8,
    tuplet: Option<(u32, u32)>,
) -> Tick {
    let mut ticks = match base {
        BaseDuration::Value(value) => ppq as f64 * value.quarters(),
        BaseDuration::Ratio {
            numerator,
            denominator,
        } => 4.0 * ppq as f64 * numerator as f64 / denominator.max(1) as f64,
    };

    ticks *= match dots {
        0 => 1.0,
        1 => 1.5,
        _ => 1.75,
    };

    if let Some((in_space_of, play)) = tuplet
        && play > 0
    {
        ticks *= in_space_of as f64 / play as f64;
    }

    (ticks.round() as Tick).max(1)
}

/// `C4 = 60`, `C-1 = 0`. Accepts any number of `#` or `b` after the letter.
pub fn note_name_to_pitch(name: &str) -> Option<u8> {
    let name = name.trim();
    let mut chars = name.chars();

    let pitch_class: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let accidentals = rest
        .chars()
        .take_while(|c| *c == '#' || *c == 'b')
        .collect::<String>();
    let shift: i32 = accidentals
        .chars()
        .map(|c| if c == '#' { 1 } else { -1 })
        .sum();

    let octave: i32 = rest[accidentals.len()..].parse().ok()?;
    let pitch = (octave + 1) * 12 + pitch_class + shift;

    if (0..=127).contains(&pitch) {
        Some(pitch as u8)
    } else {
        None
    }
}

pub fn pitch_to_note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", SHARP_NAMES[(pitch % 12) as usize], octave)
}

pub fn dynamic_velocity(mark: &str) -> Option<u8> {
    match mark.trim().to_lowercase().as_str() {
        "ppp" => Some(16),
        "pp" => Some(32),
        "p" => Some(48),
        "mp" => Some(64),
        "mf" => Some(80),
        "f" => Some(96),
        "ff" => Some(112),
        "fff" => Some(127),
        _ => None,
    }
}

/// Circle-of-fifths lookup: `"Eb"` -> `(-3, 0)`, `"F#m"` / `"F# minor"` -> `(3, 1)`.
pub fn key_signature_from_name(name: &str) -> Option<(i8, u8)> {
    let name = name.trim();
    let root_len = name
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c != '#' && *c != 'b')
        .map(|(i, _)| i)
        .unwrap_or(name.len());

    if root_len == 0 {
        return None;
    }

    let (root, mode) = name.split_at(root_len);
    let mut root_chars = root.chars();
    let root = match root_chars.next() {
        Some(letter) => format!("{}{}", letter.to_ascii_uppercase(), root_chars.as_str()),
        None => return None,
    };

    let minor = match mode.trim().to_lowercase().as_str() {
        "" | "maj" | "major" => false,
        "m" | "min" | "minor" => true,
        _ => return None,
    };

    let table = if minor { &MINOR_KEYS } else { &MAJOR_KEYS };
    let index = table.iter().position(|k| *k == root)?;

    Some((index as i8 - 7, minor as u8))
}

/// The mirror of `key_signature_from_name`, e.g. `(-3, 1)` -> `"C minor"`.
pub fn key_name(sf: i8, mi: u8) -> String {
    let index = (sf.clamp(-7, 7) + 7) as usize;

    if mi == 1 {
        format!("{} minor", MINOR_KEYS[index])
    } else {
        format!("{} major", MAJOR_KEYS[index])
    }
}

/// Tick at which `bar` (1-based) begins, walking bar by bar through whatever time
/// signature is in effect at the start of each bar. `signatures` must be sorted by
/// tick; 4/4 applies until the first one.
pub fn bar_start_tick(ppq: u32, signatures: &[TimeSignature], bar: u32) -> Tick {
    let mut tick: Tick = 0;
    let mut current = (4u8, 4u8);
    let mut next_signature = 0;

    for _ in 1..bar.max(1) {
        while let Some(ts) = signatures.get(next_signature)
            && ts.tick <= tick
        {
            current = (ts.numerator, ts.denominator);
            next_signature += 1;
        }

        tick += (bar_ticks(ppq, current.0, current.1).round() as Tick).max(1);
    }

    tick
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn positions_follow_meter() {
        assert_eq!(position_to_tick(480, 4, 4, &Position::new(1, 1)), 0);
        assert_eq!(position_to_tick(480, 4, 4, &Position::new(2, 1)), 1920);
        assert_eq!(position_to_tick(480, 4, 4, &Position::new(2, 3)), 2880);
        assert_eq!(position_to_tick(480, 6, 8, &Position::new(2, 2)), 1680);
        assert_eq!(position_to_tick(480, 4, 4, &Position::new(0, 4)), -480);

        let triplet = Position {
            bar: 1,
            beat: 1,
            unit: Some(3),
            offset: Some(2),
        };
        assert_eq!(position_to_tick(480, 4, 4, &triplet), 320);
    }

    #[test]
    fn durations_from_values_dots_and_tuplets() {
        let q = BaseDuration::Value(NoteValue::Quarter);
        assert_eq!(duration_ticks(480, q, 0, None), 480);
        assert_eq!(duration_ticks(480, q, 1, None), 720);
        assert_eq!(duration_ticks(480, q, 2, None), 840);
        assert_eq!(duration_ticks(480, q, 0, Some((2, 3))), 320);
        assert_eq!(
            duration_ticks(480, BaseDuration::Value(NoteValue::Whole), 0, None),
            1920
        );
        assert_eq!(
            duration_ticks(480, BaseDuration::Value(NoteValue::ThirtySecond), 0, None),
            60
        );
        assert_eq!(
            duration_ticks(
                480,
                BaseDuration::Ratio {
                    numerator: 3,
                    denominator: 8
                },
                0,
                None
            ),
            720
        );
    }

    #[test]
    fn durations_never_drop_below_one_tick() {
        let tiny = BaseDuration::Ratio {
            numerator: 1,
            denominator: 100_000,
        };

        for dots in 0..=2 {
            for tuplet in [None, Some((1, 9)), Some((2, 3))] {
                assert!(duration_ticks(24, tiny, dots, tuplet) >= 1);
                assert!(
                    duration_ticks(24, BaseDuration::Value(NoteValue::ThirtySecond), dots, tuplet)
                        >= 1
                );
            }
        }
    }

    #[test]
    fn note_values_parse() {
        assert_eq!("quarter".parse::<NoteValue>(), Ok(NoteValue::Quarter));
        assert_eq!("Thirty-Second".parse::<NoteValue>(), Ok(NoteValue::ThirtySecond));
        assert!("crotchet-ish".parse::<NoteValue>().is_err());
    }

    #[test]
    fn note_names_resolve() {
        assert_eq!(note_name_to_pitch("C4"), Some(60));
        assert_eq!(note_name_to_pitch("c-1"), Some(0));
        assert_eq!(note_name_to_pitch("A4"), Some(69));
        assert_eq!(note_name_to_pitch("F#3"), Some(54));
        assert_eq!(note_name_to_pitch("Bb2"), Some(46));
        assert_eq!(note_name_to_pitch("G9"), Some(127));
        assert_eq!(note_name_to_pitch("Cb4"), Some(59));
        assert_eq!(note_name_to_pitch("G#9"), None);
        assert_eq!(note_name_to_pitch("H2"), None);
        assert_eq!(note_name_to_pitch("C"), None);
        assert_eq!(pitch_to_note_name(61), "C#4");
        assert_eq!(pitch_to_note_name(0), "C-1");
    }

    #[test]
    fn dynamics_table() {
        let marks = ["pp", "p", "mp", "mf", "f", "ff"];
        let velocities: Vec<u8> = marks.iter().filter_map(|m| dynamic_velocity(m)).collect();

        assert_eq!(velocities, vec![32, 48, 64, 80, 96, 112]);
        assert_eq!(dynamic_velocity("sfz"), None);
    }

    #[test]
    fn key_signatures_round_trip_by_mode() {
        assert_eq!(key_signature_from_name("C"), Some((0, 0)));
        assert_eq!(key_signature_from_name("Eb"), Some((-3, 0)));
        assert_eq!(key_signature_from_name("F# major"), Some((6, 0)));
        assert_eq!(key_signature_from_name("Am"), Some((0, 1)));
        assert_eq!(key_signature_from_name("c minor"), Some((-3, 1)));
        assert_eq!(key_signature_from_name("Xb"), None);
        assert_eq!(key_name(-3, 0), "Eb major");
        assert_eq!(key_name(-3, 1), "C minor");
        assert_eq!(key_name(7, 1), "A# minor");
    }

    #[test]
    fn bar_starts_walk_meter_changes() {
        let signatures = vec![
            TimeSignature {
                tick: 0,
                numerator: 4,
                denominator: 4,
            },
            TimeSignature {
                tick: 3840,
                numerator: 3,
                denominator: 4,
            },
        ];

        assert_eq!(bar_start_tick(480, &signatures, 1), 0);
        assert_eq!(bar_start_tick(480, &signatures, 3), 3840);
        assert_eq!(bar_start_tick(480, &signatures, 4), 5280);
        assert_eq!(bar_start_tick(480, &[], 2), 1920);
    }
}
