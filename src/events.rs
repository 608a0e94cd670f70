use crate::capability::AudioCapabilities;
use tokio::sync::mpsc;

/// Events surfaced to the embedding session manager.
///
/// Connection and health events are distinct failure signals: a
/// `ConnectionPaused` means the transport went away, `SilenceDetected`
/// means the transport looks idle despite nominal recording, and the
/// staleness pair means transcripts stopped flowing while everything
/// else looks healthy.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Capability negotiation finished for this session
    CapabilitiesResolved(AudioCapabilities),

    /// A frame was encoded and handed to the wire
    FrameEncoded {
        sequence_number: u32,
        bytes: Vec<u8>,
    },

    /// The duplex connection closed or the server paused recording
    ConnectionPaused,

    /// The server confirmed recording is active again
    ConnectionResumed,

    /// No ping/pong traffic for longer than the silence timeout
    SilenceDetected,

    /// No non-empty transcript for longer than expected
    TranscriptStalenessDetected,

    /// Transcript activity resumed after a staleness alert
    TranscriptStalenessCleared,
}

pub type EventSender = mpsc::UnboundedSender<CoreEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoreEvent>;

/// Create the event channel handed to the caller at session creation.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
