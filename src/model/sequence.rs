use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

pub type Tick = u64;

pub const DEFAULT_US_PER_QUARTER: u32 = 500_000;
pub const MIN_PPQ: u16 = 24;
pub const MAX_PPQ: u16 = 15_360;

/// The tick-indexed document every stage agrees on: the compiler produces it,
/// the codec reads and writes it, and playback and extraction consume it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub format: u16,
    pub ppq: u16,
    pub tracks: Vec<Track>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "saturating_channel")]
    pub channel: Option<u8>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "note")]
    Note(Note),
    #[serde(rename = "cc")]
    Cc(ControlChange),
    #[serde(rename = "program")]
    Program(ProgramChange),
    #[serde(rename = "pitchBend")]
    PitchBend(PitchBend),
    #[serde(rename = "meta.tempo")]
    Tempo(Tempo),
    #[serde(rename = "meta.timeSignature")]
    TimeSignature(TimeSignature),
    #[serde(rename = "meta.keySignature")]
    KeySignature(KeySignature),
    #[serde(rename = "meta.marker")]
    Marker(Text),
    #[serde(rename = "meta.trackName")]
    TrackName(Text),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub tick: Tick,
    #[serde(deserialize_with = "saturating_u8")]
    pub pitch: u8,
    #[serde(deserialize_with = "saturating_u8")]
    pub velocity: u8,
    pub duration: Tick,
    #[serde(default, deserialize_with = "saturating_u8")]
    pub channel: u8,
    /// Human readable pitch name, filled in when decoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Note {
    pub fn end_tick(&self) -> Tick {
        self.tick + self.duration
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlChange {
    pub tick: Tick,
    #[serde(deserialize_with = "saturating_u8")]
    pub controller: u8,
    #[serde(deserialize_with = "controller_value")]
    pub value: u8,
    #[serde(default, deserialize_with = "saturating_u8")]
    pub channel: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgramChange {
    pub tick: Tick,
    #[serde(deserialize_with = "saturating_u8")]
    pub program: u8,
    #[serde(default, deserialize_with = "saturating_u8")]
    pub channel: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PitchBend {
    pub tick: Tick,
    /// Signed bend amount, -8192..=8191 with 0 at rest.
    pub value: i16,
    #[serde(default, deserialize_with = "saturating_u8")]
    pub channel: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tempo {
    pub tick: Tick,
    pub us_per_quarter: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignature {
    pub tick: Tick,
    pub numerator: u8,
    pub denominator: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeySignature {
    pub tick: Tick,
    pub sf: i8,
    pub mi: u8,
    /// Human readable key name, filled in when decoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub tick: Tick,
    pub text: String,
}

/// Controller values may arrive normalized to 0..1 from clients; anything fractional
/// is rescaled onto the 7-bit range.
fn controller_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;

    let scaled = if raw > 0.0 && raw < 1.0 {
        raw * 127.0
    } else {
        raw
    };

    Ok(scaled.round().clamp(0.0, 127.0) as u8)
}

/// Out-of-range integers saturate into a byte here so `normalize` can clamp them to
/// their real range instead of the whole document failing to parse.
fn saturating_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, u8::MAX as i64) as u8)
}

fn saturating_channel<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.map(|ch| ch.clamp(0, u8::MAX as i64) as u8))
}

impl Event {
    pub fn tick(&self) -> Tick {
        match self {
            Event::Note(e) => e.tick,
            Event::Cc(e) => e.tick,
            Event::Program(e) => e.tick,
            Event::PitchBend(e) => e.tick,
            Event::Tempo(e) => e.tick,
            Event::TimeSignature(e) => e.tick,
            Event::KeySignature(e) => e.tick,
            Event::Marker(e) | Event::TrackName(e) => e.tick,
        }
    }

    pub fn set_tick(&mut self, tick: Tick) {
        match self {
            Event::Note(e) => e.tick = tick,
            Event::Cc(e) => e.tick = tick,
            Event::Program(e) => e.tick = tick,
            Event::PitchBend(e) => e.tick = tick,
            Event::Tempo(e) => e.tick = tick,
            Event::TimeSignature(e) => e.tick = tick,
            Event::KeySignature(e) => e.tick = tick,
            Event::Marker(e) | Event::TrackName(e) => e.tick = tick,
        }
    }

    /// Tempo, time and key signature apply to the whole document rather than a track.
    pub fn is_global_meta(&self) -> bool {
        matches!(
            self,
            Event::Tempo(_) | Event::TimeSignature(_) | Event::KeySignature(_)
        )
    }

    pub fn channel(&self) -> Option<u8> {
        match self {
            Event::Note(e) => Some(e.channel),
            Event::Cc(e) => Some(e.channel),
            Event::Program(e) => Some(e.channel),
            Event::PitchBend(e) => Some(e.channel),
            _ => None,
        }
    }
}

impl Sequence {
    pub fn new(format: u16, ppq: u16) -> Self {
        Self {
            format,
            ppq,
            tracks: Vec::new(),
        }
    }

    /// Parse a canonical JSON document and clamp it into range.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut sequence: Sequence = serde_json::from_str(json)?;
        sequence.normalize();

        Ok(sequence)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.tracks.iter().flat_map(|t| t.events.iter())
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.events().filter_map(|e| match e {
            Event::Note(n) => Some(n),
            _ => None,
        })
    }

    /// Every tempo event in the document, sorted by tick.
    pub fn tempo_changes(&self) -> Vec<(Tick, u32)> {
        let mut changes: Vec<(Tick, u32)> = self
            .events()
            .filter_map(|e| match e {
                Event::Tempo(t) => Some((t.tick, t.us_per_quarter)),
                _ => None,
            })
            .collect();
        changes.sort_by_key(|(tick, _)| *tick);

        changes
    }

    /// Every time signature event in the document, sorted by tick.
    pub fn time_signatures(&self) -> Vec<TimeSignature> {
        let mut signatures: Vec<TimeSignature> = self
            .events()
            .filter_map(|e| match e {
                Event::TimeSignature(ts) => Some(*ts),
                _ => None,
            })
            .collect();
        signatures.sort_by_key(|ts| ts.tick);

        signatures
    }

    /// The tick of the last thing that happens, counting note ends.
    pub fn end_tick(&self) -> Tick {
        self.events()
            .map(|e| match e {
                Event::Note(n) => n.end_tick(),
                other => other.tick(),
            })
            .max()
            .unwrap_or(0)
    }

    /// Stable sort of every track by tick.
    pub fn sort(&mut self) {
        for track in self.tracks.iter_mut() {
            track.events.sort_by_key(|e| e.tick());
        }
    }

    /// Clamp every field into its legal range. Returns a description of each value
    /// that had to be changed.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut fixes: Vec<String> = Vec::new();

        if self.format > 1 {
            fixes.push(format!("format {} clamped to 1", self.format));
            self.format = 1;
        }

        let ppq = self.ppq.clamp(MIN_PPQ, MAX_PPQ);
        if ppq != self.ppq {
            fixes.push(format!("ppq {} clamped to {}", self.ppq, ppq));
            self.ppq = ppq;
        }

        for track in self.tracks.iter_mut() {
            if let Some(ch) = track.channel.as_mut()
                && *ch > 15
            {
                fixes.push(format!("track channel {} clamped to 15", ch));
                *ch = 15;
            }

            for event in track.events.iter_mut() {
                clamp_event(event, &mut fixes);
            }
        }

        for fix in fixes.iter() {
            warn!("Normalized sequence: {}..!", fix);
        }

        fixes
    }
}

fn clamp_u8(value: &mut u8, max: u8, what: &str, tick: Tick, fixes: &mut Vec<String>) {
    if *value > max {
        fixes.push(format!("{} {} at tick {} clamped to {}", what, value, tick, max));
        *value = max;
    }
}

fn clamp_event(event: &mut Event, fixes: &mut Vec<String>) {
    let tick = event.tick();

    match event {
        Event::Note(n) => {
            clamp_u8(&mut n.pitch, 127, "pitch", tick, fixes);
            clamp_u8(&mut n.velocity, 127, "velocity", tick, fixes);
            clamp_u8(&mut n.channel, 15, "channel", tick, fixes);
            if n.velocity == 0 {
                fixes.push(format!("velocity 0 at tick {} raised to 1", tick));
                n.velocity = 1;
            }
            if n.duration == 0 {
                fixes.push(format!("zero duration at tick {} raised to 1", tick));
                n.duration = 1;
            }
        }
        Event::Cc(c) => {
            clamp_u8(&mut c.controller, 127, "controller", tick, fixes);
            clamp_u8(&mut c.value, 127, "controller value", tick, fixes);
            clamp_u8(&mut c.channel, 15, "channel", tick, fixes);
        }
        Event::Program(p) => {
            clamp_u8(&mut p.program, 127, "program", tick, fixes);
            clamp_u8(&mut p.channel, 15, "channel", tick, fixes);
        }
        Event::PitchBend(b) => {
            if b.value > 8191 {
                fixes.push(format!("pitch bend {} at tick {} clamped to 8191", b.value, tick));
                b.value = 8191;
            } else if b.value < -8192 {
                fixes.push(format!("pitch bend {} at tick {} clamped to -8192", b.value, tick));
                b.value = -8192;
            }
            clamp_u8(&mut b.channel, 15, "channel", tick, fixes);
        }
        Event::Tempo(t) => {
            if t.us_per_quarter == 0 {
                fixes.push(format!("zero tempo at tick {} raised to 1us", tick));
                t.us_per_quarter = 1;
            } else if t.us_per_quarter > 0xFF_FFFF {
                fixes.push(format!("tempo at tick {} clamped to 24 bits", tick));
                t.us_per_quarter = 0xFF_FFFF;
            }
        }
        Event::TimeSignature(ts) => {
            if ![1, 2, 4, 8, 16, 32].contains(&ts.denominator) {
                fixes.push(format!(
                    "time signature denominator {} at tick {} replaced by 4",
                    ts.denominator, tick
                ));
                ts.denominator = 4;
            }
            if ts.numerator == 0 {
                fixes.push(format!("time signature numerator 0 at tick {} raised to 1", tick));
                ts.numerator = 1;
            }
        }
        Event::KeySignature(ks) => {
            let sf = ks.sf.clamp(-7, 7);
            if sf != ks.sf {
                fixes.push(format!("key signature sf {} at tick {} clamped to {}", ks.sf, tick, sf));
                ks.sf = sf;
            }
            clamp_u8(&mut ks.mi, 1, "key signature mode", tick, fixes);
        }
        Event::Marker(_) | Event::TrackName(_) => {}
    }
}
