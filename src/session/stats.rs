use super::pacer::PacerOutcome;
use super::session::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of one call session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Registry key of the connection
    pub connection_id: Uuid,

    /// Current state machine state
    pub state: SessionState,

    /// Media stream identifier, once learned
    pub stream_sid: Option<String>,

    /// Call identifier from the start event, once learned
    pub call_sid: Option<String>,

    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,

    /// Seconds since the connection was accepted
    pub duration_secs: f64,

    /// Inbound "media" events received
    pub inbound_media_frames: u64,

    /// Decoded mu-law bytes carried by those events
    pub inbound_media_bytes: u64,

    /// Frames sent by the current (or most recent) pacer run
    pub outbound_frames_sent: u64,

    /// Number of pacer runs launched
    pub streams_started: u64,

    /// Whether a pacer run is in progress
    pub is_streaming: bool,

    /// Outcome of the last finished pacer run
    pub last_outcome: Option<PacerOutcome>,
}
