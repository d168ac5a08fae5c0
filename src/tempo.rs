use crate::model::sequence::{DEFAULT_US_PER_QUARTER, Sequence, Tick};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    start_tick: Tick,
    us_per_quarter: u32,
    ms_at_start: f64,
}

/// Piecewise-linear tick <-> millisecond conversion. The offset at each tempo change
/// is fixed once when the map is built, so every query is a lookup plus one
/// multiplication.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppq: u32,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// Build from `(tick, microseconds per quarter)` pairs in any order. 120 bpm applies
    /// until the first change; of several changes on one tick the last one wins.
    pub fn new(ppq: u32, changes: &[(Tick, u32)]) -> Self {
        let ppq = ppq.max(1);
        let mut changes = changes.to_vec();
        changes.sort_by_key(|(tick, _)| *tick);

        let mut segments: Vec<TempoSegment> = vec![TempoSegment {
            start_tick: 0,
            us_per_quarter: DEFAULT_US_PER_QUARTER,
            ms_at_start: 0.0,
        }];

        for (tick, us_per_quarter) in changes.into_iter() {
            let us_per_quarter = us_per_quarter.max(1);
            let Some(last) = segments.last_mut() else {
                continue;
            };

            if tick == last.start_tick {
                last.us_per_quarter = us_per_quarter;
                continue;
            }

            let ms_at_start = last.ms_at_start + span_ms(tick - last.start_tick, last.us_per_quarter, ppq);
            segments.push(TempoSegment {
                start_tick: tick,
                us_per_quarter,
                ms_at_start,
            });
        }

        debug!("Built tempo map with {} segment(s) at {} ppq", segments.len(), ppq);

        Self { ppq, segments }
    }

    pub fn from_sequence(sequence: &Sequence) -> Self {
        Self::new(sequence.ppq as u32, &sequence.tempo_changes())
    }

    fn segment_for_tick(&self, tick: Tick) -> &TempoSegment {
        self.segments
            .iter()
            .rfind(|seg| seg.start_tick <= tick)
            .unwrap_or(&self.segments[0])
    }

    /// Milliseconds from tick 0 to `tick`.
    pub fn tick_to_ms(&self, tick: Tick) -> f64 {
        let segment = self.segment_for_tick(tick);
        segment.ms_at_start + span_ms(tick - segment.start_tick, segment.us_per_quarter, self.ppq)
    }

    /// The (fractional) tick sounding `ms` milliseconds after tick 0.
    pub fn ms_to_tick(&self, ms: f64) -> f64 {
        let ms = ms.max(0.0);
        let segment = self
            .segments
            .iter()
            .rfind(|seg| seg.ms_at_start <= ms)
            .unwrap_or(&self.segments[0]);

        let ms_per_tick = segment.us_per_quarter as f64 / 1000.0 / self.ppq as f64;
        segment.start_tick as f64 + (ms - segment.ms_at_start) / ms_per_tick
    }

    pub fn us_per_quarter_at(&self, tick: Tick) -> u32 {
        self.segment_for_tick(tick).us_per_quarter
    }
}

fn span_ms(ticks: Tick, us_per_quarter: u32, ppq: u32) -> f64 {
    ticks as f64 * (us_per_quarter as f64 / 1000.0) / ppq as f64
}
