//! Streaming transport
//!
//! Owns the duplex connection to the transcription service: binary
//! frame envelopes go out in strict sequence order, JSON ping/pong
//! comes back carrying authoritative timing. Reconnection policy lives
//! with the caller; this layer only reports state.

pub mod messages;
pub mod stream;

pub use messages::{shared_snapshot, ControlMessage, ServerTimingSnapshot, SharedSnapshot};
pub use stream::{ConnectionState, Duplex, StreamingTransport, WebSocketDuplex, WireMessage};
