//! Authoritative timer and silence watchdog
//!
//! Displayed elapsed time comes from server truth, not from frame
//! arrival: while the server confirms recording, the display is
//! `audio_ms` plus time since the snapshot arrived; otherwise it is
//! frozen at the reconciled `audio_ms`. The watchdog detects the
//! absence of ping/pong traffic, which is a distinct failure mode from
//! a closed transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::events::{CoreEvent, EventSender};
use crate::transport::{ServerTimingSnapshot, SharedSnapshot};

/// Displayed elapsed milliseconds for one snapshot at one instant.
pub fn display_ms(now: Instant, snapshot: &ServerTimingSnapshot) -> u64 {
    match snapshot.received_at {
        Some(received_at) if snapshot.authoritative_recording() => {
            snapshot.audio_ms + now.duration_since(received_at).as_millis() as u64
        }
        _ => snapshot.audio_ms,
    }
}

/// Result of one timer tick.
#[derive(Debug)]
pub struct TickOutcome {
    pub display_ms: u64,
    pub event: Option<CoreEvent>,
}

/// Pure tick logic, separated from the tokio loop so tests can drive it
/// with fabricated instants.
#[derive(Debug)]
pub struct TimerCore {
    silence_timeout: Duration,
    /// Baseline for the watchdog before any ping ever arrives
    session_started_at: Instant,
    silence_warned: bool,
}

impl TimerCore {
    pub fn new(silence_timeout: Duration, now: Instant) -> Self {
        Self {
            silence_timeout,
            session_started_at: now,
            silence_warned: false,
        }
    }

    /// Evaluate one tick: compute the display value and run the
    /// watchdog. The watchdog fires at most once per quiet period.
    pub fn tick(
        &mut self,
        now: Instant,
        snapshot: &ServerTimingSnapshot,
        nominally_recording: bool,
    ) -> TickOutcome {
        let display_ms = display_ms(now, snapshot);

        if !nominally_recording {
            self.silence_warned = false;
            return TickOutcome {
                display_ms,
                event: None,
            };
        }

        let quiet_since = snapshot.received_at.unwrap_or(self.session_started_at);
        let quiet = now.duration_since(quiet_since);

        let event = if quiet > self.silence_timeout {
            if self.silence_warned {
                None
            } else {
                warn!(
                    "No ping/pong for {:.0}s while nominally recording",
                    quiet.as_secs_f64()
                );
                self.silence_warned = true;
                Some(CoreEvent::SilenceDetected)
            }
        } else {
            // Traffic arrived inside the window; re-arm the watchdog.
            self.silence_warned = false;
            None
        };

        TickOutcome { display_ms, event }
    }

    pub fn reset(&mut self, now: Instant) {
        self.session_started_at = now;
        self.silence_warned = false;
    }
}

/// Read side of the displayed counter, safe to poll from any thread.
#[derive(Debug, Clone, Default)]
pub struct DisplayClock(Arc<AtomicU64>);

impl DisplayClock {
    pub fn elapsed_ms(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Ticks once per second regardless of frame arrival and publishes the
/// displayed counter.
pub struct AuthoritativeTimer {
    core: TimerCore,
    snapshot: SharedSnapshot,
    events: EventSender,
    display: DisplayClock,
    /// Local nominal recording state, set by the session phase hooks
    nominally_recording: Arc<AtomicBool>,
    tick_period: Duration,
}

impl AuthoritativeTimer {
    pub fn new(
        snapshot: SharedSnapshot,
        events: EventSender,
        nominally_recording: Arc<AtomicBool>,
        silence_timeout: Duration,
        tick_period: Duration,
    ) -> Self {
        Self {
            core: TimerCore::new(silence_timeout, Instant::now()),
            snapshot,
            events,
            display: DisplayClock::default(),
            nominally_recording,
            tick_period,
        }
    }

    pub fn display_clock(&self) -> DisplayClock {
        self.display.clone()
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Authoritative timer started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = match self.snapshot.lock() {
                        Ok(guard) => guard.clone(),
                        Err(_) => continue,
                    };

                    let outcome = self.core.tick(
                        Instant::now(),
                        &snapshot,
                        self.nominally_recording.load(Ordering::Relaxed),
                    );

                    self.display.0.store(outcome.display_ms, Ordering::Relaxed);
                    if let Some(event) = outcome.event {
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

        debug!("Authoritative timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use crate::transport::ControlMessage;

    fn recording_snapshot(audio_ms: u64, at: Instant) -> ServerTimingSnapshot {
        let mut snapshot = ServerTimingSnapshot::default();
        snapshot.apply(
            &ControlMessage::Ping {
                is_recording: Some(true),
                audio_ms: Some(audio_ms),
                ws_connected: Some(true),
            },
            at,
        );
        snapshot
    }

    #[test]
    fn test_display_advances_while_authoritative() {
        let t0 = Instant::now();
        let snapshot = recording_snapshot(5_000, t0);

        assert_eq!(display_ms(t0 + Duration::from_millis(3_000), &snapshot), 8_000);
    }

    #[test]
    fn test_display_freezes_after_close() {
        let t0 = Instant::now();
        let mut snapshot = recording_snapshot(5_000, t0);

        snapshot.freeze(t0 + Duration::from_millis(1_000));

        // Frozen at the reconciled value, no matter how long we wait.
        assert_eq!(display_ms(t0 + Duration::from_millis(1_000), &snapshot), 6_000);
        assert_eq!(display_ms(t0 + Duration::from_millis(9_000), &snapshot), 6_000);
    }

    #[test]
    fn test_watchdog_fires_once_after_timeout() {
        let t0 = Instant::now();
        let mut core = TimerCore::new(Duration::from_secs(90), t0);
        let snapshot = recording_snapshot(0, t0);

        // 89s quiet: nothing.
        let outcome = core.tick(t0 + Duration::from_secs(89), &snapshot, true);
        assert!(outcome.event.is_none());

        // 91s quiet: exactly one alert.
        let outcome = core.tick(t0 + Duration::from_secs(91), &snapshot, true);
        assert!(matches!(outcome.event, Some(CoreEvent::SilenceDetected)));

        // Persistent quiet must not re-warn every tick.
        let outcome = core.tick(t0 + Duration::from_secs(92), &snapshot, true);
        assert!(outcome.event.is_none());
        let outcome = core.tick(t0 + Duration::from_secs(200), &snapshot, true);
        assert!(outcome.event.is_none());
    }

    #[test]
    fn test_ping_resets_watchdog_deadline() {
        let t0 = Instant::now();
        let mut core = TimerCore::new(Duration::from_secs(90), t0);

        // A ping at 89s re-arms the deadline.
        let snapshot = recording_snapshot(0, t0 + Duration::from_secs(89));
        let outcome = core.tick(t0 + Duration::from_secs(91), &snapshot, true);
        assert!(outcome.event.is_none());

        // Quiet again for 91s past the ping: fires once more.
        let outcome = core.tick(t0 + Duration::from_secs(181), &snapshot, true);
        assert!(matches!(outcome.event, Some(CoreEvent::SilenceDetected)));
    }

    #[test]
    fn test_watchdog_silent_when_not_recording() {
        let t0 = Instant::now();
        let mut core = TimerCore::new(Duration::from_secs(90), t0);
        let snapshot = ServerTimingSnapshot::default();

        let outcome = core.tick(t0 + Duration::from_secs(500), &snapshot, false);
        assert!(outcome.event.is_none());
    }

    #[test]
    fn test_watchdog_uses_session_start_before_first_ping() {
        let t0 = Instant::now();
        let mut core = TimerCore::new(Duration::from_secs(90), t0);
        let snapshot = ServerTimingSnapshot::default();

        let outcome = core.tick(t0 + Duration::from_secs(91), &snapshot, true);
        assert!(matches!(outcome.event, Some(CoreEvent::SilenceDetected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_task_publishes_display() {
        let (events, _rx) = event_channel();
        let snapshot = crate::transport::shared_snapshot();
        let recording = Arc::new(AtomicBool::new(true));

        snapshot
            .lock()
            .unwrap()
            .apply(
                &ControlMessage::Ping {
                    is_recording: Some(true),
                    audio_ms: Some(2_000),
                    ws_connected: Some(true),
                },
                Instant::now(),
            );

        let timer = AuthoritativeTimer::new(
            snapshot,
            events,
            recording,
            Duration::from_secs(90),
            Duration::from_secs(1),
        );
        let clock = timer.display_clock();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(timer.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(3_100)).await;

        // Paused tokio time advances instantly while the wall clock
        // barely moves, so the published value stays near audio_ms. The
        // arithmetic itself is covered by the pure TimerCore tests.
        let shown = clock.elapsed_ms();
        assert!(
            (2_000..2_500).contains(&shown),
            "display should track audio_ms, got {}",
            shown
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
