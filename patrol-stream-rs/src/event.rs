// patrol-stream-rs/src/event.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest payload field kept on a single event, in bytes.
pub const MAX_EVENT_FIELD_BYTES: usize = 8 * 1024;

const TRUNCATION_SUFFIX: &str = "...[truncated]";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    /// Synthetic catch-up state; never advances the sequence.
    Snapshot,
    Phase,
    #[default]
    Content,
    ToolStart,
    ToolEnd,
    Error,
    Done,
}

impl StreamEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventType::Snapshot => "snapshot",
            StreamEventType::Phase => "phase",
            StreamEventType::Content => "content",
            StreamEventType::ToolStart => "tool_start",
            StreamEventType::ToolEnd => "tool_end",
            StreamEventType::Error => "error",
            StreamEventType::Done => "done",
        }
    }
}

impl fmt::Display for StreamEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a subscriber received a snapshot instead of (or before) a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    /// Subscribed without a last-seen sequence.
    LateJoiner,
    /// The last-seen sequence fell out of the replay buffer.
    BufferRotated,
    /// The last-seen sequence is ahead of this run (likely a previous run).
    StaleLastEventId,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::LateJoiner => "late_joiner",
            SnapshotReason::BufferRotated => "buffer_rotated",
            SnapshotReason::StaleLastEventId => "stale_last_event_id",
        }
    }
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One event on the patrol stream.
///
/// `seq`, `run_id` and `ts_ms` are stamped by the hub on broadcast; callers
/// leave them at their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatrolStreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    #[serde(default)]
    pub seq: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    #[serde(default)]
    pub ts_ms: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tokens: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_input: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_success: Option<bool>,

    // Snapshot-only fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync_reason: Option<SnapshotReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_end: Option<u64>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl PatrolStreamEvent {
    pub fn new(event_type: StreamEventType) -> Self {
        Self {
            event_type,
            ..Default::default()
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Self::new(StreamEventType::Content)
        }
    }

    pub fn phase(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Self::new(StreamEventType::Phase)
        }
    }

    pub fn tool_start(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            tool_id: id.into(),
            tool_name: name.into(),
            tool_input: input.into(),
            ..Self::new(StreamEventType::ToolStart)
        }
    }

    pub fn tool_end(
        id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            tool_id: id.into(),
            tool_name: name.into(),
            tool_output: output.into(),
            tool_success: Some(success),
            ..Self::new(StreamEventType::ToolEnd)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            ..Self::new(StreamEventType::Error)
        }
    }

    pub fn done() -> Self {
        Self::new(StreamEventType::Done)
    }

    pub fn is(&self, event_type: StreamEventType) -> bool {
        self.event_type == event_type
    }

    /// Caps every free-text payload at [`MAX_EVENT_FIELD_BYTES`].
    pub(crate) fn truncate_fields(&mut self) {
        for field in [
            &mut self.content,
            &mut self.tool_input,
            &mut self.tool_output,
        ] {
            truncate_field(field, MAX_EVENT_FIELD_BYTES);
        }
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Shortens `s` to at most `max` bytes, ending in `...[truncated]` when
/// there is room for the marker.
pub fn truncate_field(s: &mut String, max: usize) {
    if max == 0 || s.len() <= max {
        return;
    }
    if max <= TRUNCATION_SUFFIX.len() {
        let cut = floor_char_boundary(s, max);
        s.truncate(cut);
        return;
    }
    let cut = floor_char_boundary(s, max - TRUNCATION_SUFFIX.len());
    s.truncate(cut);
    s.push_str(TRUNCATION_SUFFIX);
}
