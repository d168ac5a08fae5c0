//! The declarative score document accepted by the compiler.
//!
//! These types mirror the JSON a client sends and are deliberately loose: most
//! fields are optional and nothing is range-checked here. The compiler's
//! validation pass turns a `Score` into a fully resolved form before any ticks
//! are produced.

use crate::error::CompileError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PPQ: u32 = 480;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    #[serde(default = "default_ppq")]
    pub ppq: u32,
    #[serde(default)]
    pub meta: ScoreMeta,
    #[serde(default)]
    pub tracks: Vec<ScoreTrack>,
}

fn default_ppq() -> u32 {
    DEFAULT_PPQ
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMeta {
    pub time_signature: Option<TimeSignatureSpec>,
    pub key_signature: Option<String>,
    pub tempo: Option<TempoSpec>,
    pub title: Option<String>,
    #[serde(default)]
    pub auto_cc_presets: Vec<AutoCcPreset>,
}

/// Either `"3/4"` or `{ "numerator": 3, "denominator": 4 }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TimeSignatureSpec {
    Text(String),
    Parts { numerator: u8, denominator: u8 },
}

/// Either a fixed bpm or a list of changes placed at bar/beat positions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TempoSpec {
    Fixed(f64),
    Changes(Vec<TempoChangeSpec>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TempoChangeSpec {
    pub bar: u32,
    #[serde(default = "first_beat")]
    pub beat: u32,
    pub bpm: f64,
}

fn first_beat() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutoCcPreset {
    SustainFromSlur,
    CrescendoToExpression,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTrack {
    pub name: Option<String>,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub program: u8,
    #[serde(default)]
    pub events: Vec<ScoreEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScoreEvent {
    Note(NoteSpec),
    Marker(TextSpec),
    TrackName(TextSpec),
    Cc(CcSpec),
    PitchBend(PitchBendSpec),
}

/// A bar/beat position. `unit`/`offset` pick a fraction of the beat: the 2nd of
/// 3 equal parts is `{ unit: 3, offset: 1 }`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub bar: u32,
    #[serde(default = "first_beat")]
    pub beat: u32,
    pub unit: Option<u32>,
    pub offset: Option<u32>,
}

impl Position {
    pub fn new(bar: u32, beat: u32) -> Self {
        Self {
            bar,
            beat,
            unit: None,
            offset: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PitchSpec {
    Number(i64),
    Name(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum DurationValue {
    Token(String),
    Ratio { numerator: u32, denominator: u32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tuplet {
    pub in_space_of: u32,
    pub play: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Articulation {
    Staccato,
    Tenuto,
    Legato,
    Slur,
    Accent,
    Marcato,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NoteSpec {
    pub pitch: PitchSpec,
    pub start: Position,
    pub duration: DurationValue,
    #[serde(default)]
    pub dots: u8,
    pub tuplet: Option<Tuplet>,
    pub velocity: Option<i64>,
    pub dynamic: Option<String>,
    pub articulation: Option<Articulation>,
    #[serde(default)]
    pub tie: bool,
    #[serde(default)]
    pub slur: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TextSpec {
    pub text: String,
    pub at: Position,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CcSpec {
    pub controller: u8,
    pub value: i64,
    pub at: Position,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PitchBendSpec {
    pub value: i32,
    pub at: Position,
}

impl Score {
    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        serde_json::from_str(json).map_err(|e| CompileError::Schema {
            path: format!("line {}, column {}", e.line(), e.column()),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_shorthand_and_long_forms() {
        let json = r#"{
            "ppq": 960,
            "meta": {
                "timeSignature": "3/4",
                "keySignature": "Bb",
                "tempo": [{ "bar": 1, "bpm": 90 }, { "bar": 5, "beat": 2, "bpm": 120 }],
                "autoCcPresets": ["sustain_from_slur"]
            },
            "tracks": [{
                "channel": 2,
                "program": 40,
                "events": [
                    { "type": "note", "pitch": "F#4", "start": { "bar": 1, "beat": 1 }, "duration": "eighth", "dots": 1 },
                    { "type": "note", "pitch": 64, "start": { "bar": 1, "beat": 2, "unit": 3, "offset": 1 },
                      "duration": { "numerator": 1, "denominator": 12 }, "articulation": "staccato", "tie": true },
                    { "type": "cc", "controller": 64, "value": 127, "at": { "bar": 2 } },
                    { "type": "trackName", "text": "Violin", "at": { "bar": 1 } }
                ]
            }]
        }"#;

        let score = Score::from_json(json).unwrap();
        assert_eq!(score.ppq, 960);
        assert_eq!(
            score.meta.time_signature,
            Some(TimeSignatureSpec::Text(String::from("3/4")))
        );
        assert_eq!(score.meta.auto_cc_presets, vec![AutoCcPreset::SustainFromSlur]);

        let Some(TempoSpec::Changes(changes)) = &score.meta.tempo else {
            panic!("expected a tempo change list");
        };
        assert_eq!(changes[0].beat, 1);
        assert_eq!(changes[1].beat, 2);

        let track = &score.tracks[0];
        assert_eq!(track.events.len(), 4);

        let ScoreEvent::Note(second) = &track.events[1] else {
            panic!("expected a note");
        };
        assert_eq!(second.pitch, PitchSpec::Number(64));
        assert_eq!(second.start.unit, Some(3));
        assert_eq!(
            second.duration,
            DurationValue::Ratio {
                numerator: 1,
                denominator: 12
            }
        );
        assert_eq!(second.articulation, Some(Articulation::Staccato));
        assert!(second.tie);
    }

    #[test]
    fn schema_errors_carry_a_location() {
        let err = Score::from_json(r#"{ "tracks": [{ "events": [{ "type": "bogus" }] }] }"#)
            .unwrap_err();

        assert!(matches!(err, CompileError::Schema { .. }));
    }
}
