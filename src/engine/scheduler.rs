use crate::engine::timeline::{ScheduledEvent, Timeline, build_timeline};
use crate::engine::{CC_ALL_NOTES_OFF, CC_SUSTAIN, MidiMessage, OutputSink};
use crate::model::sequence::Sequence;
use anyhow::bail;
use log::{debug, info, warn};
use serde::Serialize;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub type SessionId = Uuid;

enum ControlMsg {
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleOptions {
    /// Only play from this many milliseconds into the document.
    pub start_ms: Option<f64>,
    /// Stop dispatching after this many milliseconds into the document.
    pub stop_ms: Option<f64>,
    /// Report counts and duration without dispatching anything.
    pub analyze_only: bool,
    /// How far ahead of the clock each poll arms timers.
    pub lookahead_ms: u64,
    /// Interval of the coarse poll.
    pub poll_ms: u64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            start_ms: None,
            stop_ms: None,
            analyze_only: false,
            lookahead_ms: 50,
            poll_ms: 10,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReport {
    pub scheduled_event_count: usize,
    pub total_duration_ms: f64,
    /// `None` when nothing is being dispatched.
    pub handle_id: Option<SessionId>,
    pub warnings: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub scheduled_event_count: usize,
    pub total_duration_ms: f64,
    /// Number of events armed so far by the lookahead scan.
    pub cursor: usize,
    pub last_dispatched_index: Option<usize>,
    /// Wall-clock offset from the session origin of the last dispatch.
    pub last_dispatched_at_ms: Option<f64>,
    pub failed_dispatches: usize,
    pub done: bool,
    pub cancelled: bool,
}

struct Session {
    state: Arc<Mutex<PlaybackStatus>>,
    control_tx: Sender<ControlMsg>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Session {
    fn snapshot(&self) -> Option<PlaybackStatus> {
        self.state.lock().ok().map(|s| s.clone())
    }

    fn is_finished(&self) -> bool {
        self.state.lock().map(|s| s.done).unwrap_or(true)
    }

    fn join(&mut self) {
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
            debug!("Playback thread joined..!");
        }
    }
}

/// Registry of live playback sessions. Each session runs on its own worker
/// thread with its own timers and sink; ids are never reused.
pub struct Scheduler {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Analyze `sequence` and, unless analysis was requested or there is nowhere to
    /// send it, start dispatching it to `sink` in a new session.
    pub fn schedule(
        &self,
        sequence: &Sequence,
        options: &ScheduleOptions,
        sink: Option<Box<dyn OutputSink>>,
    ) -> anyhow::Result<ScheduleReport> {
        if let (Some(start), Some(stop)) = (options.start_ms, options.stop_ms)
            && stop < start
        {
            bail!("stopMs {} is before startMs {}..!", stop, start);
        }

        let Timeline {
            events,
            total_duration_ms,
            mut warnings,
        } = build_timeline(sequence, options.start_ms, options.stop_ms);

        let mut report = ScheduleReport {
            scheduled_event_count: events.len(),
            total_duration_ms,
            handle_id: None,
            warnings: Vec::new(),
        };

        let sink = match sink {
            _ if options.analyze_only => None,
            Some(sink) => Some(sink),
            None => {
                let warning = String::from("DeviceUnavailable: no output sink, falling back to analysis only");
                warn!("{}..!", warning);
                warnings.push(warning);
                None
            }
        };

        let Some(sink) = sink else {
            info!(
                "Analyzed {} event(s) spanning {:.3}ms..!",
                report.scheduled_event_count, report.total_duration_ms
            );
            report.warnings = warnings;
            return Ok(report);
        };

        let id = Uuid::new_v4();
        let state = Arc::new(Mutex::new(PlaybackStatus {
            scheduled_event_count: events.len(),
            total_duration_ms,
            ..Default::default()
        }));
        let (tx, rx) = mpsc::channel::<ControlMsg>();

        let worker_state = Arc::clone(&state);
        let lookahead = Duration::from_millis(options.lookahead_ms);
        let poll = Duration::from_millis(options.poll_ms.max(1));
        let handle = thread::Builder::new()
            .name(format!("playback-{}", id))
            .spawn(move || {
                run_session(events, sink, lookahead, poll, worker_state, rx);
            })?;

        {
            let Ok(mut sessions) = self.sessions.lock() else {
                bail!("Failed to lock the session registry..!");
            };

            prune_finished(&mut sessions);
            sessions.insert(
                id,
                Session {
                    state,
                    control_tx: tx,
                    worker_handle: Some(handle),
                },
            );
        }

        info!(
            "Started playback session {} with {} event(s) over {:.3}ms..!",
            id, report.scheduled_event_count, report.total_duration_ms
        );

        report.handle_id = Some(id);
        report.warnings = warnings;

        Ok(report)
    }

    /// Current status of a session. A finished session reports its final status once
    /// and is then forgotten; it is also dropped by the next `schedule` or `sessions`
    /// call if nobody asked.
    pub fn status(&self, id: &SessionId) -> Option<PlaybackStatus> {
        let Ok(mut sessions) = self.sessions.lock() else {
            warn!("Failed to lock the session registry..!");
            return None;
        };

        let snapshot = sessions.get(id)?.snapshot()?;

        if snapshot.done
            && let Some(mut session) = sessions.remove(id)
        {
            session.join();
        }

        Some(snapshot)
    }

    /// Stop a session, flush its channels and close its sink.
    pub fn cancel(&self, id: &SessionId) -> anyhow::Result<()> {
        let session = {
            let Ok(mut sessions) = self.sessions.lock() else {
                bail!("Failed to lock the session registry..!");
            };
            sessions.remove(id)
        };

        let Some(mut session) = session else {
            bail!("No playback session {}..!", id);
        };

        let _ = session.control_tx.send(ControlMsg::Stop);
        session.join();
        info!("Cancelled playback session {}..!", id);

        Ok(())
    }

    /// Block until a session finishes and return its final status.
    pub fn wait(&self, id: &SessionId) -> anyhow::Result<PlaybackStatus> {
        let state = {
            let Ok(sessions) = self.sessions.lock() else {
                bail!("Failed to lock the session registry..!");
            };
            let Some(session) = sessions.get(id) else {
                bail!("No playback session {}..!", id);
            };
            Arc::clone(&session.state)
        };

        loop {
            let Ok(snapshot) = state.lock().map(|s| s.clone()) else {
                bail!("Failed to lock playback state..!");
            };

            if snapshot.done {
                // Cancelled from elsewhere while we were waiting.
                if let Some(last) = self.status(id) {
                    return Ok(last);
                }
                return Ok(snapshot);
            }

            spin_sleep::sleep(Duration::from_millis(10));
        }
    }

    /// Ids of every session still running.
    pub fn sessions(&self) -> Vec<SessionId> {
        let Ok(mut sessions) = self.sessions.lock() else {
            warn!("Failed to lock the session registry..!");
            return Vec::new();
        };

        prune_finished(&mut sessions);
        sessions.keys().copied().collect()
    }
}

/// Drop sessions whose worker has already flushed and closed its sink.
fn prune_finished(sessions: &mut HashMap<SessionId, Session>) {
    let finished: Vec<SessionId> = sessions
        .iter()
        .filter(|(_, session)| session.is_finished())
        .map(|(id, _)| *id)
        .collect();

    for id in finished {
        if let Some(mut session) = sessions.remove(&id) {
            session.join();
            debug!("Pruned finished session {}..!", id);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };

        for (id, mut session) in sessions.drain() {
            let _ = session.control_tx.send(ControlMsg::Stop);
            session.join();
            debug!("Stopped session {} on shutdown..!", id);
        }
    }
}

/// One-shot timers keyed by absolute offset from the session origin.
#[derive(Default)]
struct TimerQueue {
    heap: BinaryHeap<Reverse<(Duration, usize)>>,
}

impl TimerQueue {
    fn arm(&mut self, deadline: Duration, index: usize) {
        self.heap.push(Reverse((deadline, index)));
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    fn pop_due(&mut self, now: Duration) -> Option<usize> {
        match self.next_deadline() {
            Some(deadline) if deadline <= now => self.heap.pop().map(|Reverse((_, index))| index),
            _ => None,
        }
    }

    fn clear(&mut self) -> usize {
        let pending = self.heap.len();
        self.heap.clear();
        pending
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Everything the worker needs to release what it started.
#[derive(Default)]
struct Voices {
    active: HashSet<(u8, u8)>,
    touched: BTreeSet<u8>,
}

impl Voices {
    fn track(&mut self, message: &MidiMessage) {
        self.touched.insert(message.channel());

        match *message {
            MidiMessage::NoteOn { channel, pitch, .. } => {
                self.active.insert((channel, pitch));
            }
            MidiMessage::NoteOff { channel, pitch } => {
                self.active.remove(&(channel, pitch));
            }
            _ => {}
        }
    }
}

fn run_session(
    events: Vec<ScheduledEvent>,
    mut sink: Box<dyn OutputSink>,
    lookahead: Duration,
    poll: Duration,
    state: Arc<Mutex<PlaybackStatus>>,
    ctrl_rx: Receiver<ControlMsg>,
) {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut timers = TimerQueue::default();
    let mut voices = Voices::default();
    let mut cursor = 0;
    let mut next_poll = Duration::ZERO;
    let mut failed = 0;
    let mut cancelled = false;

    let origin = Instant::now();

    loop {
        if let Ok(ControlMsg::Stop) = ctrl_rx.try_recv() {
            let dropped = timers.clear();
            warn!(
                "Playback stopped via control message after {:.3}s, {} timer(s) dropped..!",
                origin.elapsed().as_secs_f64(),
                dropped
            );
            cancelled = true;
            break;
        }

        let now = origin.elapsed();

        if now >= next_poll {
            let horizon = now + lookahead;

            while let Some(event) = events.get(cursor)
                && event.offset() <= horizon
            {
                timers.arm(event.offset(), cursor);
                cursor += 1;
            }

            if let Ok(mut status) = state.lock() {
                status.cursor = cursor;
            }

            // Poll ticks sit on multiples of the interval from the origin.
            let polls = (now.as_nanos() / poll.as_nanos().max(1)) as u32 + 1;
            next_poll = poll * polls;
        }

        while let Some(index) = timers.pop_due(origin.elapsed()) {
            let event = &events[index];
            let emitted_at_ms = origin.elapsed().as_secs_f64() * 1000.0;

            voices.track(&event.message);

            if let Err(why) = sink.send(&event.message) {
                failed += 1;
                warn!(
                    "Dispatch error for event #{} at {:.3}ms | why: {:?}",
                    index, emitted_at_ms, why
                );
            }

            debug!(
                "Dispatched #{} {:?} at {:>10.3}ms | scheduled for: {:>10.3}ms",
                index, event.message, emitted_at_ms, event.at_ms
            );

            if let Ok(mut status) = state.lock() {
                status.last_dispatched_index = Some(index);
                status.last_dispatched_at_ms = Some(emitted_at_ms);
                status.failed_dispatches = failed;
            }
        }

        if cursor >= events.len() && timers.is_empty() {
            info!("Playback thread finished all events..!");
            break;
        }

        let wake = timers
            .next_deadline()
            .map_or(next_poll, |deadline| deadline.min(next_poll));
        let now = origin.elapsed();

        if wake > now {
            sleeper.sleep(wake - now);
        }
    }

    failed += flush(sink.as_mut(), &voices);

    if let Err(why) = sink.close() {
        warn!("Failed to close output sink | why: {:?}", why);
    }

    if let Ok(mut status) = state.lock() {
        status.failed_dispatches = failed;
        status.cancelled = cancelled;
        status.done = true;
    }
}

/// Sustain off and all-notes-off on every touched channel, then release each
/// voice still sounding. Returns the number of sends that failed.
fn flush(sink: &mut dyn OutputSink, voices: &Voices) -> usize {
    let mut messages: Vec<MidiMessage> = Vec::new();

    for channel in voices.touched.iter() {
        messages.push(MidiMessage::ControlChange {
            channel: *channel,
            controller: CC_SUSTAIN,
            value: 0,
        });
        messages.push(MidiMessage::ControlChange {
            channel: *channel,
            controller: CC_ALL_NOTES_OFF,
            value: 0,
        });
    }

    let mut active: Vec<&(u8, u8)> = voices.active.iter().collect();
    active.sort();
    for (channel, pitch) in active {
        messages.push(MidiMessage::NoteOff {
            channel: *channel,
            pitch: *pitch,
        });
    }

    debug!(
        "Flushing {} channel(s) and {} active voice(s)..!",
        voices.touched.len(),
        voices.active.len()
    );

    let mut failed = 0;
    for message in messages.iter() {
        if let Err(why) = sink.send(message) {
            failed += 1;
            warn!("Flush error for {:?} | why: {:?}", message, why);
        }
    }

    failed
}
