//! Typed failures for the pure transforms (compile, decode, extract).
//!
//! Runtime plumbing (the playback registry, output sinks and the CLI) uses
//! `anyhow` instead, since those failures are only ever reported.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The score document doesn't have the expected shape.
    #[error("Schema violation at {path}: {message}")]
    Schema { path: String, message: String },

    /// A note name couldn't be turned into a MIDI pitch.
    #[error("Unresolved pitch '{name}' at {path}")]
    UnresolvedPitch { path: String, name: String },

    /// A duration token or ratio that doesn't describe a note length.
    #[error("Invalid duration '{token}' at {path}")]
    InvalidDuration { path: String, token: String },

    #[error("Missing required meta field '{0}'")]
    MissingMeta(&'static str),

    #[error("PPQ {0} is outside the supported range 24..=15360")]
    InvalidPpq(u32),

    /// Every problem found by the validation pass, in document order.
    #[error("{} problems found in score: {}", .0.len(), join_errors(.0))]
    Invalid(Vec<CompileError>),
}

fn join_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Truncated chunk #{index}: declared {declared} bytes, only {available} available")]
    TruncatedChunk {
        index: usize,
        declared: usize,
        available: usize,
    },

    #[error("Track #{0} is not terminated by an end-of-track event")]
    UnterminatedTrack(usize),

    #[error("Unsupported file format {0} (only 0 and 1 are supported)")]
    UnsupportedFormat(u16),

    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,

    #[error("Failed to parse MIDI: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    #[error("Bar indices must be at least 1 (got start {start}, end {end})")]
    NonPositiveBar { start: u32, end: u32 },

    #[error("Start bar {start} is after end bar {end}")]
    InvertedRange { start: u32, end: u32 },
}
