use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{ControlMessage, SharedSnapshot};
use crate::codec;
use crate::events::{CoreEvent, EventSender};
use crate::pcm::PcmFrame;

/// Connection lifecycle. `authoritative_recording` is orthogonal to
/// this: it comes from inbound data, not from the socket being up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// One inbound message from the duplex wire.
#[derive(Debug)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

/// The duplex wire, abstracted so tests can run against an in-process
/// mock instead of a live WebSocket.
#[async_trait]
pub trait Duplex: Send {
    async fn send_binary(&mut self, payload: Vec<u8>) -> Result<()>;
    async fn send_text(&mut self, text: String) -> Result<()>;
    /// Next inbound message; returns `Closed` once the wire is gone.
    async fn next_message(&mut self) -> WireMessage;
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket implementation of the duplex wire.
pub struct WebSocketDuplex {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WebSocketDuplex {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to transcription endpoint: {}", url);

        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        info!("WebSocket connected");

        Ok(Self { stream })
    }
}

#[async_trait]
impl Duplex for WebSocketDuplex {
    async fn send_binary(&mut self, payload: Vec<u8>) -> Result<()> {
        self.stream
            .send(tungstenite::Message::Binary(payload))
            .await
            .context("Failed to send binary frame")
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(tungstenite::Message::Text(text))
            .await
            .context("Failed to send control message")
    }

    async fn next_message(&mut self) -> WireMessage {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => return WireMessage::Text(text),
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return WireMessage::Binary(data)
                }
                // Protocol-level ping/pong is handled by tungstenite
                // itself; the application ping/pong travels as JSON text.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    return WireMessage::Closed;
                }
                None => return WireMessage::Closed,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.ok();
        Ok(())
    }
}

/// Owns one duplex connection: forwards encoded frames in order, folds
/// inbound ping/pong into the timing snapshot, and reports connection
/// health. Never reconnects by itself; a reconnect is a logically new
/// transport instance built by the caller, with fresh sequence state.
pub struct StreamingTransport {
    state: ConnectionState,
    snapshot: SharedSnapshot,
    events: EventSender,
    authoritative: bool,
    /// One paused signal per close: set when emitted, cleared when the
    /// server confirms recording again.
    paused_emitted: bool,
    last_sequence: Option<u32>,
    frames_sent: u64,
    bytes_sent: u64,
    /// Frames refused locally: out-of-order or inconsistent payloads
    frames_dropped: u64,
}

impl StreamingTransport {
    pub fn new(snapshot: SharedSnapshot, events: EventSender) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            snapshot,
            events,
            authoritative: false,
            paused_emitted: false,
            last_sequence: None,
            frames_sent: 0,
            bytes_sent: 0,
            frames_dropped: 0,
        }
    }

    /// Open the WebSocket for this transport. A failed connect surfaces
    /// to the caller; its reconnection policy decides what happens next.
    pub async fn connect(&mut self, url: &str) -> Result<WebSocketDuplex> {
        self.state = ConnectionState::Connecting;

        match WebSocketDuplex::connect(url).await {
            Ok(duplex) => Ok(duplex),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Drive one established connection to completion.
    pub async fn run<D: Duplex>(&mut self, mut duplex: D, mut frame_rx: mpsc::Receiver<PcmFrame>) {
        self.state = ConnectionState::Open;
        let mut draining = false;

        loop {
            tokio::select! {
                frame = frame_rx.recv(), if !draining => {
                    match frame {
                        Some(frame) => {
                            if !self.forward_frame(&mut duplex, frame).await {
                                self.handle_close();
                                return;
                            }
                        }
                        None => {
                            // Controller stopped; close our side and keep
                            // reading until the server acknowledges.
                            self.state = ConnectionState::Closing;
                            draining = true;
                            let _ = duplex.close().await;
                        }
                    }
                }
                message = duplex.next_message() => {
                    match message {
                        WireMessage::Text(text) => {
                            if let Some(reply) = self.handle_control(&text, Instant::now()) {
                                if duplex.send_text(reply).await.is_err() {
                                    self.handle_close();
                                    return;
                                }
                            }
                        }
                        WireMessage::Binary(data) => {
                            debug!("Ignoring {} unexpected binary bytes", data.len());
                        }
                        WireMessage::Closed => {
                            self.handle_close();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Encode and send one frame, preserving strict sequence order.
    /// Returns false when the wire is gone.
    async fn forward_frame<D: Duplex>(&mut self, duplex: &mut D, frame: PcmFrame) -> bool {
        if let Some(last) = self.last_sequence {
            // Strictly increasing or it never touches the wire. Gaps are
            // legal (upstream backpressure drops), regressions are not.
            if frame.sequence_number <= last {
                warn!(
                    "Dropping out-of-order frame {} (last sent {})",
                    frame.sequence_number, last
                );
                self.frames_dropped += 1;
                return true;
            }
        }

        if !frame.payload_is_consistent() {
            warn!(
                "Dropping frame {} with inconsistent payload ({} bytes for {} samples)",
                frame.sequence_number,
                frame.payload.len(),
                frame.sample_count
            );
            self.frames_dropped += 1;
            return true;
        }

        let sequence_number = frame.sequence_number;
        let encoded = codec::encode_frame(&frame);

        if duplex.send_binary(encoded.clone()).await.is_err() {
            return false;
        }

        self.last_sequence = Some(sequence_number);
        self.frames_sent += 1;
        self.bytes_sent += encoded.len() as u64;
        let _ = self.events.send(CoreEvent::FrameEncoded {
            sequence_number,
            bytes: encoded,
        });

        true
    }

    /// Fold one inbound text message into the snapshot. Returns the
    /// serialized reply to send, if any.
    pub fn handle_control(&mut self, text: &str, now: Instant) -> Option<String> {
        let message: ControlMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring unparseable control message: {}", e);
                return None;
            }
        };

        let authoritative = if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.apply(&message, now);
            Some(snapshot.authoritative_recording())
        } else {
            None
        };
        if let Some(authoritative) = authoritative {
            self.sync_authority(authoritative);
        }

        match message {
            ControlMessage::Ping { .. } => {
                // Answer immediately; the server uses the reply to probe
                // liveness on our side.
                serde_json::to_string(&ControlMessage::pong_reply()).ok()
            }
            ControlMessage::Pong { .. } => None,
        }
    }

    /// Emit resumed/paused only on authority transitions.
    fn sync_authority(&mut self, authoritative: bool) {
        if authoritative == self.authoritative {
            return;
        }
        self.authoritative = authoritative;

        if authoritative {
            info!("Server confirmed recording");
            self.paused_emitted = false;
            let _ = self.events.send(CoreEvent::ConnectionResumed);
        } else {
            info!("Server reported recording paused");
            self.paused_emitted = true;
            let _ = self.events.send(CoreEvent::ConnectionPaused);
        }
    }

    /// The wire is gone: reconcile the snapshot and emit at most one
    /// paused signal for this close.
    fn handle_close(&mut self) {
        let now = Instant::now();
        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.freeze(now);
        }
        self.authoritative = false;

        if !self.paused_emitted {
            self.paused_emitted = true;
            let _ = self.events.send(CoreEvent::ConnectionPaused);
        }

        info!(
            "Transport closed: {} frames / {} bytes sent, {} dropped",
            self.frames_sent, self.bytes_sent, self.frames_dropped
        );
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn authoritative_recording(&self) -> bool {
        self.authoritative
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}
