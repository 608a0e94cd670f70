use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Control messages exchanged as JSON text alongside binary frames.
///
/// The server uses ping/pong both as keepalive and as the carrier for
/// authoritative timing: every message may include the server's view of
/// recording state and cumulative audio duration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Ping {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        is_recording: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        audio_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        ws_connected: Option<bool>,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        is_recording: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        audio_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        ws_connected: Option<bool>,
    },
}

impl ControlMessage {
    /// A bare pong reply carrying no local claims.
    pub fn pong_reply() -> Self {
        ControlMessage::Pong {
            is_recording: None,
            audio_ms: None,
            ws_connected: None,
        }
    }

    pub fn timing_fields(&self) -> (Option<bool>, Option<u64>, Option<bool>) {
        match self {
            ControlMessage::Ping {
                is_recording,
                audio_ms,
                ws_connected,
            }
            | ControlMessage::Pong {
                is_recording,
                audio_ms,
                ws_connected,
            } => (*is_recording, *audio_ms, *ws_connected),
        }
    }
}

/// Last-known server truth, updated only by inbound transport messages.
///
/// Written from the transport task, read by the authoritative timer and
/// never mid-write: the mutex is held only for field copies.
#[derive(Debug, Clone)]
pub struct ServerTimingSnapshot {
    /// Server-confirmed recording state
    pub is_recording: bool,
    /// Cumulative authoritative audio duration in milliseconds
    pub audio_ms: u64,
    /// Server's view of its own upstream connection
    pub ws_connected: bool,
    /// Local monotonic clock when the last message arrived
    pub received_at: Option<Instant>,
}

impl Default for ServerTimingSnapshot {
    fn default() -> Self {
        Self {
            is_recording: false,
            audio_ms: 0,
            ws_connected: false,
            received_at: None,
        }
    }
}

impl ServerTimingSnapshot {
    /// Authoritative recording is derived from inbound data, never from
    /// connection state alone.
    pub fn authoritative_recording(&self) -> bool {
        self.is_recording && self.ws_connected
    }

    /// Fold one inbound control message into the snapshot. Absent fields
    /// leave their previous values untouched.
    pub fn apply(&mut self, message: &ControlMessage, now: Instant) {
        let (is_recording, audio_ms, ws_connected) = message.timing_fields();

        if let Some(recording) = is_recording {
            self.is_recording = recording;
        }
        if let Some(ms) = audio_ms {
            self.audio_ms = ms;
        }
        if let Some(connected) = ws_connected {
            self.ws_connected = connected;
        }
        self.received_at = Some(now);
    }

    /// Reconcile elapsed time into `audio_ms` when authority is lost, so
    /// a frozen display lands on the time the server would have reported.
    pub fn freeze(&mut self, now: Instant) {
        if self.authoritative_recording() {
            if let Some(at) = self.received_at {
                self.audio_ms += now.duration_since(at).as_millis() as u64;
            }
        }
        self.ws_connected = false;
        self.received_at = Some(now);
    }

    /// Zero everything for a new session.
    pub fn reset(&mut self) {
        *self = ServerTimingSnapshot::default();
    }
}

/// Shared handle: single writer (transport task), timer/monitor readers.
pub type SharedSnapshot = Arc<Mutex<ServerTimingSnapshot>>;

pub fn shared_snapshot() -> SharedSnapshot {
    Arc::new(Mutex::new(ServerTimingSnapshot::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ping_wire_format() {
        let json = r#"{"type":"ping","is_recording":true,"audio_ms":5000,"ws_connected":true}"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();

        assert_eq!(
            msg,
            ControlMessage::Ping {
                is_recording: Some(true),
                audio_ms: Some(5_000),
                ws_connected: Some(true),
            }
        );
    }

    #[test]
    fn test_bare_ping_parses() {
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg.timing_fields(), (None, None, None));
    }

    #[test]
    fn test_pong_reply_is_bare() {
        let json = serde_json::to_string(&ControlMessage::pong_reply()).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_apply_keeps_absent_fields() {
        let mut snapshot = ServerTimingSnapshot::default();
        let now = Instant::now();

        snapshot.apply(
            &ControlMessage::Ping {
                is_recording: Some(true),
                audio_ms: Some(4_000),
                ws_connected: Some(true),
            },
            now,
        );
        snapshot.apply(
            &ControlMessage::Pong {
                is_recording: None,
                audio_ms: None,
                ws_connected: None,
            },
            now,
        );

        assert!(snapshot.is_recording);
        assert_eq!(snapshot.audio_ms, 4_000);
        assert!(snapshot.authoritative_recording());
    }

    #[test]
    fn test_freeze_reconciles_elapsed_time() {
        let mut snapshot = ServerTimingSnapshot::default();
        let t0 = Instant::now();

        snapshot.apply(
            &ControlMessage::Ping {
                is_recording: Some(true),
                audio_ms: Some(5_000),
                ws_connected: Some(true),
            },
            t0,
        );
        snapshot.freeze(t0 + Duration::from_millis(1_000));

        assert_eq!(snapshot.audio_ms, 6_000);
        assert!(!snapshot.authoritative_recording());
    }

    #[test]
    fn test_freeze_without_authority_keeps_audio_ms() {
        let mut snapshot = ServerTimingSnapshot {
            is_recording: false,
            audio_ms: 3_000,
            ws_connected: true,
            received_at: Some(Instant::now()),
        };

        snapshot.freeze(Instant::now() + Duration::from_secs(5));

        assert_eq!(snapshot.audio_ms, 3_000);
    }
}
