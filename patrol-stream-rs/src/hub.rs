// patrol-stream-rs/src/hub.rs
// Single-writer, many-subscriber event hub for one patrol run.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::event::{PatrolStreamEvent, SnapshotReason, StreamEventType};
use crate::tail::OutputTail;

/// Number of broadcast events kept for resume-by-seq.
pub const REPLAY_BUFFER_SIZE: usize = 256;
/// Per-subscriber queue depth.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;
/// Consecutive full-queue deliveries tolerated before a subscriber is dropped.
pub const BACKPRESSURE_EVICTION_THRESHOLD: u32 = 25;
/// Phase label of a hub with no run in progress.
pub const IDLE_PHASE: &str = "idle";

/// How a subscription was seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No last-seen sequence; a late-joiner snapshot was queued.
    Fresh,
    /// Buffered events newer than the last-seen sequence were queued.
    Replay(usize),
    /// A resync snapshot was queued (possibly followed by replayed events).
    Snapshot(SnapshotReason),
    /// Nothing buffered to resume from; treated as a fresh subscribe.
    Miss,
}

impl ResumeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeOutcome::Fresh => "fresh",
            ResumeOutcome::Replay(_) => "replay",
            ResumeOutcome::Snapshot(_) => "snapshot",
            ResumeOutcome::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    Backpressure,
    Closed,
}

impl DropReason {
    fn as_str(&self) -> &'static str {
        match self {
            DropReason::Backpressure => "backpressure",
            DropReason::Closed => "closed",
        }
    }
}

/// Running totals for the stream, exposed for status endpoints and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub fresh: u64,
    pub replays: u64,
    pub replayed_events: u64,
    pub snapshots_late_joiner: u64,
    pub snapshots_buffer_rotated: u64,
    pub snapshots_stale_last_event_id: u64,
    pub misses: u64,
    pub drops_backpressure: u64,
    pub drops_closed: u64,
}

impl StreamStats {
    fn record_snapshot(&mut self, reason: SnapshotReason) {
        match reason {
            SnapshotReason::LateJoiner => self.snapshots_late_joiner += 1,
            SnapshotReason::BufferRotated => self.snapshots_buffer_rotated += 1,
            SnapshotReason::StaleLastEventId => self.snapshots_stale_last_event_id += 1,
        }
    }

    fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Backpressure => self.drops_backpressure += 1,
            DropReason::Closed => self.drops_closed += 1,
        }
    }
}

struct Subscriber {
    sender: mpsc::Sender<PatrolStreamEvent>,
    full_count: u32,
}

struct HubState {
    run_id: String,
    seq: u64,
    phase: String,
    current_tool: String,
    output: OutputTail,
    events: VecDeque<PatrolStreamEvent>,
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
    stats: StreamStats,
}

/// What `subscribe_from` queued, gathered under the lock and reported after.
struct ResumePlan {
    outcome: ResumeOutcome,
    snapshot: Option<SnapshotReason>,
    replayed: usize,
}

impl HubState {
    fn new() -> Self {
        Self {
            run_id: String::new(),
            seq: 0,
            phase: IDLE_PHASE.to_string(),
            current_tool: String::new(),
            output: OutputTail::default(),
            events: VecDeque::with_capacity(REPLAY_BUFFER_SIZE),
            subscribers: HashMap::new(),
            next_id: 1,
            stats: StreamStats::default(),
        }
    }

    fn buffer_window(&self) -> (u64, u64) {
        match (self.events.front(), self.events.back()) {
            (Some(first), Some(last)) => (first.seq, last.seq),
            _ => (0, 0),
        }
    }

    fn make_snapshot(&self, reason: SnapshotReason) -> PatrolStreamEvent {
        let (start, end) = self.buffer_window();
        let phase = if self.phase == IDLE_PHASE {
            String::new()
        } else {
            self.phase.clone()
        };

        PatrolStreamEvent {
            seq: end,
            run_id: self.run_id.clone(),
            ts_ms: Utc::now().timestamp_millis(),
            content: self.output.as_str().to_string(),
            phase,
            tool_name: self.current_tool.clone(),
            resync_reason: Some(reason),
            content_truncated: self.output.is_truncated().then_some(true),
            buffer_start: Some(start),
            buffer_end: Some(end),
            ..PatrolStreamEvent::new(StreamEventType::Snapshot)
        }
    }

    fn stamp(&mut self, event: &mut PatrolStreamEvent) {
        match event.event_type {
            StreamEventType::ToolStart => self.current_tool = event.tool_name.clone(),
            StreamEventType::ToolEnd => self.current_tool.clear(),
            _ => {}
        }

        event.truncate_fields();
        if event.run_id.is_empty() {
            event.run_id = self.run_id.clone();
        }
        self.seq += 1;
        event.seq = self.seq;
        if event.ts_ms == 0 {
            event.ts_ms = Utc::now().timestamp_millis();
        }

        self.events.push_back(event.clone());
        while self.events.len() > REPLAY_BUFFER_SIZE {
            self.events.pop_front();
        }
    }

    fn deliver(&mut self, event: &PatrolStreamEvent) -> Vec<(u64, DropReason)> {
        let mut evicted = Vec::new();
        for (id, subscriber) in self.subscribers.iter_mut() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => subscriber.full_count = 0,
                Err(TrySendError::Full(_)) => {
                    subscriber.full_count += 1;
                    if subscriber.full_count >= BACKPRESSURE_EVICTION_THRESHOLD {
                        evicted.push((*id, DropReason::Backpressure));
                    }
                }
                Err(TrySendError::Closed(_)) => evicted.push((*id, DropReason::Closed)),
            }
        }

        // Removing the entry drops the sender, which closes the receiver side.
        for (id, reason) in &evicted {
            self.subscribers.remove(id);
            self.stats.record_drop(*reason);
        }
        evicted
    }

    fn resume(&mut self, sender: &mpsc::Sender<PatrolStreamEvent>, last_seq: u64) -> ResumePlan {
        let (start, end) = self.buffer_window();
        let mut snapshot = None;

        if !self.events.is_empty() && last_seq < start {
            let snap = self.make_snapshot(SnapshotReason::BufferRotated);
            if sender.try_send(snap).is_ok() {
                snapshot = Some(SnapshotReason::BufferRotated);
            }
        }

        let mut replayed = 0;
        for event in self.events.iter().filter(|e| e.seq > last_seq) {
            if sender.try_send(event.clone()).is_err() {
                // The subscriber picks up live events from here.
                break;
            }
            replayed += 1;
        }

        let mut outcome = None;
        if replayed == 0 && snapshot.is_none() {
            if self.events.is_empty() {
                let snap = self.make_snapshot(SnapshotReason::LateJoiner);
                if sender.try_send(snap).is_ok() {
                    snapshot = Some(SnapshotReason::LateJoiner);
                }
                outcome = Some(ResumeOutcome::Miss);
            } else if last_seq > end {
                let snap = self.make_snapshot(SnapshotReason::StaleLastEventId);
                if sender.try_send(snap).is_ok() {
                    snapshot = Some(SnapshotReason::StaleLastEventId);
                }
            }
        }

        let outcome = outcome.unwrap_or(match snapshot {
            Some(reason) => ResumeOutcome::Snapshot(reason),
            None => ResumeOutcome::Replay(replayed),
        });

        ResumePlan {
            outcome,
            snapshot,
            replayed,
        }
    }
}

struct Inner {
    state: Mutex<HubState>,
}

/// Patrol stream hub.
///
/// One mutex guards phase, tail, replay buffer and the subscriber set.
/// Delivery never blocks: a subscriber whose queue stays full for
/// [`BACKPRESSURE_EVICTION_THRESHOLD`] consecutive broadcasts is evicted
/// and its queue closed.
#[derive(Clone)]
pub struct PatrolStreamHub {
    inner: Arc<Inner>,
}

impl Default for PatrolStreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PatrolStreamHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(HubState::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a new run: sequence, phase, tool, tail and replay buffer are
    /// cleared. Existing subscribers stay attached.
    pub fn reset_for_run(&self, run_id: impl Into<String>) {
        let run_id = run_id.into();
        let mut state = self.lock();
        state.run_id = run_id.clone();
        state.seq = 0;
        state.phase = IDLE_PHASE.to_string();
        state.current_tool.clear();
        state.output.clear();
        state.events.clear();
        drop(state);

        debug!(run_id = %run_id, "Patrol stream reset for new run");
    }

    pub fn run_id(&self) -> String {
        self.lock().run_id.clone()
    }

    pub fn phase(&self) -> String {
        self.lock().phase.clone()
    }

    /// Records a phase change and broadcasts it. Returning to idle and
    /// repeating the current phase are silent.
    pub fn set_phase(&self, phase: impl Into<String>) {
        let phase = phase.into();
        {
            let mut state = self.lock();
            if state.phase == phase {
                return;
            }
            state.phase = phase.clone();
        }

        if phase != IDLE_PHASE {
            self.broadcast(PatrolStreamEvent::phase(phase));
        }
    }

    /// Appends planner text to the tail and broadcasts it as a content event.
    pub fn append_content(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.lock().output.push(text);
        self.broadcast(PatrolStreamEvent::content(text));
    }

    /// Stamps, buffers and fans out one event. Returns the assigned sequence.
    pub fn broadcast(&self, mut event: PatrolStreamEvent) -> u64 {
        let (seq, evicted) = {
            let mut state = self.lock();
            state.stamp(&mut event);
            let evicted = state.deliver(&event);
            (event.seq, evicted)
        };

        for (id, reason) in evicted {
            counter!("patrol_stream_subscriber_drops_total", 1, "reason" => reason.as_str());
            match reason {
                DropReason::Backpressure => {
                    warn!(subscriber = id, seq, "Evicted patrol stream subscriber after sustained backpressure")
                }
                DropReason::Closed => debug!(subscriber = id, "Removed closed patrol stream subscriber"),
            }
        }
        seq
    }

    /// Current tail content and phase.
    pub fn current_output(&self) -> (String, String) {
        let state = self.lock();
        (state.output.as_str().to_string(), state.phase.clone())
    }

    /// Subscribes with no resume point; the first event is a snapshot.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_from(0)
    }

    /// Subscribes and resumes after `last_seq` where the buffer allows it.
    pub fn subscribe_from(&self, last_seq: u64) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);

        let (id, plan) = {
            let mut state = self.lock();
            let plan = if last_seq == 0 {
                let sent = sender
                    .try_send(state.make_snapshot(SnapshotReason::LateJoiner))
                    .is_ok();
                ResumePlan {
                    outcome: ResumeOutcome::Fresh,
                    snapshot: sent.then_some(SnapshotReason::LateJoiner),
                    replayed: 0,
                }
            } else {
                state.resume(&sender, last_seq)
            };

            match plan.outcome {
                ResumeOutcome::Fresh => state.stats.fresh += 1,
                ResumeOutcome::Replay(_) => state.stats.replays += 1,
                ResumeOutcome::Snapshot(_) => {}
                ResumeOutcome::Miss => state.stats.misses += 1,
            }
            if let Some(reason) = plan.snapshot {
                state.stats.record_snapshot(reason);
            }
            state.stats.replayed_events += plan.replayed as u64;

            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(
                id,
                Subscriber {
                    sender,
                    full_count: 0,
                },
            );
            (id, plan)
        };

        if last_seq > 0 {
            counter!("patrol_stream_resume_total", 1, "outcome" => plan.outcome.as_str());
        }
        if plan.replayed > 0 {
            counter!("patrol_stream_replay_events_total", plan.replayed as u64);
            debug!(last_seq, replayed_events = plan.replayed, "Patrol stream replayed buffered events");
        }
        if let Some(reason) = plan.snapshot {
            counter!("patrol_stream_snapshot_total", 1, "reason" => reason.as_str());
            debug!(last_seq, resync_reason = reason.as_str(), "Patrol stream sent snapshot");
        }
        if plan.outcome == ResumeOutcome::Miss {
            debug!(last_seq, "Patrol stream resume found nothing buffered");
        }

        Subscription {
            id,
            receiver,
            outcome: plan.outcome,
        }
    }

    /// Detaches a subscriber. Safe to call more than once.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn stats(&self) -> StreamStats {
        self.lock().stats.clone()
    }

    /// `(start, end)` sequence window of the replay buffer; `(0, 0)` when empty.
    pub fn buffer_window(&self) -> (u64, u64) {
        self.lock().buffer_window()
    }
}

/// Receiving half of a hub subscription.
///
/// Dropping it without calling [`PatrolStreamHub::unsubscribe`] is fine: the
/// hub removes the entry on its next broadcast.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<PatrolStreamEvent>,
    outcome: ResumeOutcome,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn outcome(&self) -> ResumeOutcome {
        self.outcome
    }

    /// Next event; `None` once the hub has evicted or dropped this subscriber.
    pub async fn recv(&mut self) -> Option<PatrolStreamEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PatrolStreamEvent> {
        self.receiver.try_recv().ok()
    }
}
