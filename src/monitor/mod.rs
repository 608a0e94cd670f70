//! Transcript health monitor
//!
//! Catches the failure the transport cannot see: the connection is up,
//! frames are flowing out, and yet no transcript text has come back for
//! implausibly long. Purely time-driven polling; it must keep working
//! even when the transport believes itself healthy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::events::{CoreEvent, EventSender};

/// Per-session transcript activity, fed by the caller whenever a
/// non-empty transcript fragment arrives.
#[derive(Debug, Clone, Default)]
pub struct TranscriptActivity {
    pub session_id: Option<String>,
    pub recording_started_at: Option<Instant>,
    pub last_non_empty_transcript_at: Option<Instant>,
}

/// Shared activity handle: the session facade writes, the monitor reads.
#[derive(Debug, Clone, Default)]
pub struct ActivityHandle(Arc<Mutex<TranscriptActivity>>);

impl ActivityHandle {
    pub fn begin_session(&self, session_id: &str, now: Instant) {
        if let Ok(mut activity) = self.0.lock() {
            *activity = TranscriptActivity {
                session_id: Some(session_id.to_string()),
                recording_started_at: Some(now),
                last_non_empty_transcript_at: None,
            };
        }
    }

    pub fn end_session(&self) {
        if let Ok(mut activity) = self.0.lock() {
            *activity = TranscriptActivity::default();
        }
    }

    /// Record transcript activity. Empty fragments and foreign sessions
    /// do not count as signs of life.
    pub fn notify_transcript(&self, session_id: &str, text: &str, _is_final: bool) {
        if text.trim().is_empty() {
            return;
        }
        if let Ok(mut activity) = self.0.lock() {
            if activity.session_id.as_deref() == Some(session_id) {
                activity.last_non_empty_transcript_at = Some(Instant::now());
            }
        }
    }

    pub fn snapshot(&self) -> TranscriptActivity {
        self.0
            .lock()
            .map(|activity| activity.clone())
            .unwrap_or_default()
    }
}

/// Pure staleness rule, one alert per session until activity resumes.
#[derive(Debug)]
pub struct StalenessTracker {
    /// Recording must run at least this long before evaluation starts
    grace: Duration,
    /// How stale the newest transcript may be
    stale_after: Duration,
    alerted: bool,
}

impl StalenessTracker {
    pub fn new(grace: Duration, stale_after: Duration) -> Self {
        Self {
            grace,
            stale_after,
            alerted: false,
        }
    }

    /// Evaluate once. Returns a detected/cleared event on transitions,
    /// nothing otherwise. Suspended sessions are not evaluated: a
    /// legitimate pause must not read as a stalled pipeline.
    pub fn evaluate(
        &mut self,
        now: Instant,
        activity: &TranscriptActivity,
        nominally_recording: bool,
    ) -> Option<CoreEvent> {
        if !nominally_recording {
            return None;
        }

        let started_at = activity.recording_started_at?;

        if now.duration_since(started_at) < self.grace {
            return None;
        }

        // With no transcript ever seen, the whole recording counts as
        // the quiet period.
        let last_activity = activity.last_non_empty_transcript_at.unwrap_or(started_at);
        let staleness = now.duration_since(last_activity);

        if staleness > self.stale_after {
            if self.alerted {
                None
            } else {
                warn!(
                    "No transcript activity for {:.0}s while recording",
                    staleness.as_secs_f64()
                );
                self.alerted = true;
                Some(CoreEvent::TranscriptStalenessDetected)
            }
        } else if self.alerted {
            debug!("Transcript activity resumed");
            self.alerted = false;
            Some(CoreEvent::TranscriptStalenessCleared)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.alerted = false;
    }
}

/// Polls the activity handle on a fixed interval and raises staleness
/// events. Deliberately ignorant of transport state.
pub struct HealthMonitor {
    tracker: StalenessTracker,
    activity: ActivityHandle,
    events: EventSender,
    /// Local nominal recording state, shared with the session hooks
    nominally_recording: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        activity: ActivityHandle,
        events: EventSender,
        nominally_recording: Arc<AtomicBool>,
        grace: Duration,
        stale_after: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tracker: StalenessTracker::new(grace, stale_after),
            activity,
            events,
            nominally_recording,
            poll_interval,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Health monitor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let activity = self.activity.snapshot();
                    let recording = self.nominally_recording.load(Ordering::Relaxed);
                    if let Some(event) = self.tracker.evaluate(Instant::now(), &activity, recording)
                    {
                        let _ = self.events.send(event);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Health monitor stopped");
    }
}
