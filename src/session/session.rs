use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::stats::SessionStats;
use crate::capability::{negotiate, DeviceHints, EncoderRegistry};
use crate::config::CoreConfig;
use crate::controller::{MediaSource, PcmAudioController};
use crate::events::{event_channel, CoreEvent, EventReceiver, EventSender};
use crate::monitor::{ActivityHandle, HealthMonitor};
use crate::timing::{AuthoritativeTimer, DisplayClock};
use crate::transport::{shared_snapshot, SharedSnapshot, StreamingTransport};

/// Wires the capture pipeline together for one recording session:
/// controller -> codec -> transport, with the authoritative timer and
/// health monitor running alongside.
///
/// The external session manager owns the recording phases; this facade
/// only exposes the hooks those phase transitions call. Everything is
/// scoped to one session: `start` resets all state even when the device
/// and encoder are unchanged.
pub struct CaptureSession {
    config: CoreConfig,
    session_id: String,
    events: EventSender,
    controller: PcmAudioController,
    snapshot: SharedSnapshot,
    activity: ActivityHandle,
    display: Option<DisplayClock>,
    /// Local nominal recording state, consumed by the silence watchdog
    nominally_recording: Arc<AtomicBool>,
    transcript_count: Arc<AtomicUsize>,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    started_at: Option<chrono::DateTime<Utc>>,
    is_recording: bool,
}

impl CaptureSession {
    /// Create a session facade and the event stream the caller consumes.
    pub fn new(config: CoreConfig) -> (Self, EventReceiver) {
        let (events, event_rx) = event_channel();

        let controller = PcmAudioController::new(
            config.block_channel_capacity,
            config.frame_channel_capacity,
        );

        let session = Self {
            config,
            session_id: String::new(),
            events,
            controller,
            snapshot: shared_snapshot(),
            activity: ActivityHandle::default(),
            display: None,
            nominally_recording: Arc::new(AtomicBool::new(false)),
            transcript_count: Arc::new(AtomicUsize::new(0)),
            shutdown: None,
            tasks: Vec::new(),
            started_at: None,
            is_recording: false,
        };

        (session, event_rx)
    }

    /// Start one recording session: negotiate capabilities, acquire the
    /// source, connect the transport, and begin monitoring.
    pub async fn start(
        &mut self,
        source: Box<dyn MediaSource>,
        registry: &dyn EncoderRegistry,
        hints: &DeviceHints,
    ) -> Result<()> {
        if self.is_recording {
            warn!("Capture session already started");
            return Ok(());
        }

        self.session_id = format!("session-{}", uuid::Uuid::new_v4());
        info!("Starting capture session: {}", self.session_id);

        // Fresh truth for a fresh session.
        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.reset();
        }
        self.transcript_count.store(0, Ordering::Relaxed);

        let caps = negotiate(registry, hints);
        let _ = self
            .events
            .send(CoreEvent::CapabilitiesResolved(caps.clone()));

        let frame_rx = self
            .controller
            .initialize(source, &caps)
            .context("Failed to initialize audio controller")?;

        // Connect before spawning so acquisition failures surface to the
        // caller instead of vanishing into a task.
        let mut transport = StreamingTransport::new(self.snapshot.clone(), self.events.clone());
        let duplex = match transport.connect(&self.config.endpoint_url).await {
            Ok(duplex) => duplex,
            Err(e) => {
                self.controller.stop();
                return Err(e.context("Failed to open streaming transport"));
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.tasks.push(tokio::spawn(async move {
            transport.run(duplex, frame_rx).await;
        }));

        let timer = AuthoritativeTimer::new(
            self.snapshot.clone(),
            self.events.clone(),
            Arc::clone(&self.nominally_recording),
            self.config.silence_timeout(),
            self.config.timer_tick(),
        );
        self.display = Some(timer.display_clock());
        self.tasks.push(tokio::spawn(timer.run(shutdown_rx.clone())));

        let monitor = HealthMonitor::new(
            self.activity.clone(),
            self.events.clone(),
            Arc::clone(&self.nominally_recording),
            self.config.staleness_grace(),
            self.config.stale_after(),
            self.config.staleness_poll(),
        );
        self.tasks.push(tokio::spawn(monitor.run(shutdown_rx)));

        self.activity.begin_session(&self.session_id, Instant::now());
        self.nominally_recording.store(true, Ordering::Relaxed);
        self.shutdown = Some(shutdown_tx);
        self.started_at = Some(Utc::now());
        self.is_recording = true;

        info!("Capture session started: {}", self.session_id);
        Ok(())
    }

    /// Stop the session and release everything. Safe from any state and
    /// idempotent: redundant calls are no-ops.
    pub async fn stop(&mut self) {
        if !self.is_recording {
            return;
        }

        info!("Stopping capture session: {}", self.session_id);

        self.nominally_recording.store(false, Ordering::Relaxed);
        self.activity.end_session();

        // Stopping the controller closes the frame channel, which lets
        // the transport close its side and drain out.
        self.controller.stop();

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Session task panicked: {}", e);
            }
        }

        self.is_recording = false;
        info!("Capture session stopped: {}", self.session_id);
    }

    /// Phase hook: the session manager moved to `suspended`.
    pub fn suspend(&self) {
        info!("Capture session suspended");
        self.nominally_recording.store(false, Ordering::Relaxed);
    }

    /// Phase hook: the session manager moved back to `active`.
    pub fn resume(&self) {
        info!("Capture session resumed");
        if self.is_recording {
            self.nominally_recording.store(true, Ordering::Relaxed);
        }
    }

    /// Feed transcript activity into the health monitor.
    pub fn notify_transcript(&self, session_id: &str, text: &str, is_final: bool) {
        self.activity.notify_transcript(session_id, text, is_final);

        if session_id == self.session_id && !text.trim().is_empty() {
            self.transcript_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current session statistics.
    pub fn stats(&self) -> SessionStats {
        let controller = self.controller.state();

        SessionStats {
            session_id: self.session_id.clone(),
            is_recording: self.is_recording,
            started_at: self.started_at,
            displayed_ms: self
                .display
                .as_ref()
                .map(|clock| clock.elapsed_ms())
                .unwrap_or(0),
            frames_emitted: controller.frames_emitted,
            frames_dropped: controller.frames_dropped,
            transcript_segments_count: self.transcript_count.load(Ordering::Relaxed),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
