pub mod capability;
pub mod codec;
pub mod config;
pub mod controller;
pub mod events;
pub mod monitor;
pub mod pcm;
pub mod session;
pub mod timing;
pub mod transport;

pub use capability::{
    negotiate, AudioCapabilities, CodecSpec, DeviceHints, EncoderRegistry, FormFactor,
};
pub use config::CoreConfig;
pub use controller::{
    BlockSink, ControllerState, MediaSource, PcmAudioController, ProcessingStrategy,
};
pub use events::{CoreEvent, EventReceiver, EventSender};
pub use monitor::{ActivityHandle, HealthMonitor, StalenessTracker, TranscriptActivity};
pub use pcm::{FrameProcessor, MonoResampler, PcmFrame, SampleFormat};
pub use session::{CaptureSession, SessionStats};
pub use timing::{display_ms, AuthoritativeTimer, DisplayClock, TimerCore};
pub use transport::{
    ConnectionState, ControlMessage, Duplex, ServerTimingSnapshot, StreamingTransport,
    WebSocketDuplex, WireMessage,
};
