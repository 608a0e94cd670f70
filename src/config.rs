use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable thresholds for the streaming core.
///
/// The silence timeout and the staleness windows are independent knobs.
/// They happen to default to values in the same neighborhood, but nothing
/// in the core assumes they match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// WebSocket endpoint of the transcription service
    pub endpoint_url: String,

    /// How long without ping/pong traffic before the silence watchdog fires
    /// Default: 90 seconds
    pub silence_timeout_ms: u64,

    /// Minimum recording duration before transcript staleness is evaluated
    /// Default: 120 seconds
    pub staleness_grace_ms: u64,

    /// How stale the newest transcript may be before an alert is raised
    /// Default: 120 seconds
    pub stale_after_ms: u64,

    /// Health monitor polling interval
    /// Default: 30 seconds
    pub staleness_poll_ms: u64,

    /// Authoritative timer tick period
    /// Default: 1 second
    pub timer_tick_ms: u64,

    /// Capacity of the frame channel between controller and transport
    pub frame_channel_capacity: usize,

    /// Capacity of the raw block channel into the processing worker
    pub block_channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://localhost:8080/api/stream".to_string(),
            silence_timeout_ms: 90_000,
            staleness_grace_ms: 120_000,
            stale_after_ms: 120_000,
            staleness_poll_ms: 30_000,
            timer_tick_ms: 1_000,
            frame_channel_capacity: 256,
            block_channel_capacity: 64,
        }
    }
}

impl CoreConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    pub fn staleness_grace(&self) -> Duration {
        Duration::from_millis(self.staleness_grace_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn staleness_poll(&self) -> Duration {
        Duration::from_millis(self.staleness_poll_ms)
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }
}
