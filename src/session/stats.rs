use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier, regenerated on every start
    pub session_id: String,

    /// Whether capture is currently active
    pub is_recording: bool,

    /// When the session started, if it ever did
    pub started_at: Option<DateTime<Utc>>,

    /// Server-reconciled displayed duration in milliseconds
    pub displayed_ms: u64,

    /// Frames handed to the transport so far
    pub frames_emitted: u64,

    /// Frames dropped under backpressure
    pub frames_dropped: u64,

    /// Non-empty transcript fragments seen for this session
    pub transcript_segments_count: usize,
}
