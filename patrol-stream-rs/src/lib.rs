//! # Patrol Stream
//!
//! Live event stream for a patrol run. A single writer broadcasts phase,
//! content and tool events; any number of readers subscribe, optionally
//! resuming from the last sequence they saw.
//!
//! Late joiners and readers whose resume point has rotated out of the
//! replay buffer receive a synthetic `snapshot` event carrying the current
//! phase, the content tail and the buffered sequence window.

pub mod event;
pub mod hub;
pub mod tail;

pub use event::{truncate_field, PatrolStreamEvent, SnapshotReason, StreamEventType, MAX_EVENT_FIELD_BYTES};
pub use hub::{
    PatrolStreamHub, ResumeOutcome, StreamStats, Subscription, BACKPRESSURE_EVICTION_THRESHOLD,
    IDLE_PHASE, REPLAY_BUFFER_SIZE, SUBSCRIBER_QUEUE_CAPACITY,
};
pub use tail::{OutputTail, MAX_OUTPUT_BYTES};
