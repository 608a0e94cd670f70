use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capability::AudioCapabilities;
use crate::pcm::{FrameProcessor, PcmFrame};

/// Callback handed to the media source. Invoked from the platform's
/// realtime audio context; it must never block.
pub type BlockSink = Box<dyn FnMut(&[f32]) + Send>;

/// Platform audio source abstraction.
///
/// Implementations deliver interleaved f32 blocks to the sink from
/// whatever callback mechanism the platform provides. `stop` must cease
/// callbacks and release the sink (dropping it closes the processing
/// channel), must be idempotent, and must release the underlying
/// hardware resource.
pub trait MediaSource: Send {
    fn sample_rate_hz(&self) -> u32;
    fn channel_count(&self) -> u16;
    /// Whether an isolated execution context is available for
    /// processing. Checked once at initialize; the answer must not
    /// change mid-session.
    fn supports_worker(&self) -> bool;
    fn start(&mut self, sink: BlockSink) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Execution strategy, chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStrategy {
    /// Dedicated thread hosts the frame processor
    Worker,
    /// Processing runs inline in the block callback
    Inline,
}

/// Phase-relevant controller state for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    pub is_capturing: bool,
    pub strategy: Option<ProcessingStrategy>,
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub blocks_dropped: u64,
}

/// Owns setup/teardown of the capture pipeline and converts raw blocks
/// into wire-ready PCM frames.
pub struct PcmAudioController {
    block_channel_capacity: usize,
    frame_channel_capacity: usize,
    source: Option<Box<dyn MediaSource>>,
    strategy: Option<ProcessingStrategy>,
    worker: Option<JoinHandle<()>>,
    is_capturing: Arc<AtomicBool>,
    frames_emitted: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,
    blocks_dropped: Arc<AtomicU64>,
}

impl PcmAudioController {
    pub fn new(block_channel_capacity: usize, frame_channel_capacity: usize) -> Self {
        Self {
            block_channel_capacity,
            frame_channel_capacity,
            source: None,
            strategy: None,
            worker: None,
            is_capturing: Arc::new(AtomicBool::new(false)),
            frames_emitted: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            blocks_dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start capturing from the source and return the frame stream.
    ///
    /// Counters and buffers start from zero: no sequence numbers or
    /// partial samples leak across sessions. Acquisition failure is
    /// fatal to the session and surfaced once, never retried here.
    pub fn initialize(
        &mut self,
        mut source: Box<dyn MediaSource>,
        caps: &AudioCapabilities,
    ) -> Result<mpsc::Receiver<PcmFrame>> {
        if self.source.is_some() {
            bail!("Controller already initialized; call stop() first");
        }

        self.frames_emitted.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.blocks_dropped.store(0, Ordering::Relaxed);

        let (frame_tx, frame_rx) = mpsc::channel(self.frame_channel_capacity);
        let input_rate = source.sample_rate_hz();
        let channels = source.channel_count();

        let strategy = if source.supports_worker() {
            ProcessingStrategy::Worker
        } else {
            ProcessingStrategy::Inline
        };

        info!(
            "Initializing PCM controller: {}Hz {}ch input, {:?} strategy",
            input_rate, channels, strategy
        );

        let sink = match strategy {
            ProcessingStrategy::Worker => {
                self.spawn_worker(input_rate, channels, caps.clone(), frame_tx)?
            }
            ProcessingStrategy::Inline => self.inline_sink(input_rate, channels, caps, frame_tx),
        };

        source
            .start(sink)
            .context("Failed to acquire audio source")?;

        self.source = Some(source);
        self.strategy = Some(strategy);
        self.is_capturing.store(true, Ordering::Relaxed);

        Ok(frame_rx)
    }

    /// Worker strategy: blocks cross a bounded channel to a dedicated
    /// thread; the callback side only copies and try-sends.
    fn spawn_worker(
        &mut self,
        input_rate: u32,
        channels: u16,
        caps: AudioCapabilities,
        frame_tx: mpsc::Sender<PcmFrame>,
    ) -> Result<BlockSink> {
        let (block_tx, block_rx) =
            std::sync::mpsc::sync_channel::<Vec<f32>>(self.block_channel_capacity);

        let frames_emitted = Arc::clone(&self.frames_emitted);
        let frames_dropped = Arc::clone(&self.frames_dropped);

        let worker = std::thread::Builder::new()
            .name("pcm-frame-worker".to_string())
            .spawn(move || {
                let mut processor = FrameProcessor::new(input_rate, &caps);
                let mut frames = Vec::new();

                while let Ok(block) = block_rx.recv() {
                    processor.process_block(&block, channels, &mut frames);
                    if !deliver_frames(&mut frames, &frame_tx, &frames_emitted, &frames_dropped)
                    {
                        break;
                    }
                }

                debug!("Frame worker exiting");
            })
            .context("Failed to spawn frame worker thread")?;

        self.worker = Some(worker);

        let blocks_dropped = Arc::clone(&self.blocks_dropped);
        Ok(Box::new(move |block: &[f32]| {
            // Copy-and-hand-off is all the realtime callback does. A
            // full channel means the worker is behind; drop the block
            // rather than stall the audio thread.
            if block_tx.try_send(block.to_vec()).is_err() {
                let dropped = blocks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 50 == 1 {
                    warn!("Audio blocks dropped under backpressure: {}", dropped);
                }
            }
        }))
    }

    /// Inline strategy: the same processor, driven directly from the
    /// block callback with a larger intermediate buffer.
    fn inline_sink(
        &self,
        input_rate: u32,
        channels: u16,
        caps: &AudioCapabilities,
        frame_tx: mpsc::Sender<PcmFrame>,
    ) -> BlockSink {
        let mut processor =
            FrameProcessor::with_buffer_hint(input_rate, caps, caps.frame_sample_count * 16);
        let mut frames = Vec::new();
        let frames_emitted = Arc::clone(&self.frames_emitted);
        let frames_dropped = Arc::clone(&self.frames_dropped);

        Box::new(move |block: &[f32]| {
            processor.process_block(block, channels, &mut frames);
            deliver_frames(&mut frames, &frame_tx, &frames_emitted, &frames_dropped);
        })
    }

    /// Stop capturing and release everything. Idempotent in any call
    /// order and never panics; teardown errors are logged, not raised.
    pub fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop() {
                warn!("Audio source teardown error: {}", e);
            }
            // Dropping the source drops the sink, which closes the block
            // channel and lets the worker drain out.
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Frame worker panicked during shutdown");
            }
        }

        if self.is_capturing.swap(false, Ordering::Relaxed) {
            info!(
                "PCM controller stopped: {} frames emitted, {} dropped, {} blocks dropped",
                self.frames_emitted.load(Ordering::Relaxed),
                self.frames_dropped.load(Ordering::Relaxed),
                self.blocks_dropped.load(Ordering::Relaxed),
            );
        }
    }

    pub fn state(&self) -> ControllerState {
        ControllerState {
            is_capturing: self.is_capturing.load(Ordering::Relaxed),
            strategy: self.strategy,
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PcmAudioController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Push completed frames into the bounded frame channel without
/// blocking. Returns false once the receiver is gone.
fn deliver_frames(
    frames: &mut Vec<PcmFrame>,
    frame_tx: &mpsc::Sender<PcmFrame>,
    frames_emitted: &AtomicU64,
    frames_dropped: &AtomicU64,
) -> bool {
    for frame in frames.drain(..) {
        match frame_tx.try_send(frame) {
            Ok(()) => {
                frames_emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(frame)) => {
                let dropped = frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 50 == 1 {
                    warn!(
                        "Frame {} dropped under backpressure ({} total)",
                        frame.sequence_number, dropped
                    );
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{negotiate, CodecSpec, DeviceHints, EncoderRegistry};
    use std::sync::Mutex;

    struct NoEncoders;

    impl EncoderRegistry for NoEncoders {
        fn is_encodable(&self, _spec: &CodecSpec) -> bool {
            false
        }
    }

    fn pcm_caps() -> AudioCapabilities {
        negotiate(&NoEncoders, &DeviceHints::default())
    }

    /// Test source: the test holds the sink and feeds blocks by hand.
    struct ScriptedSource {
        sample_rate_hz: u32,
        channels: u16,
        worker: bool,
        sink: Arc<Mutex<Option<BlockSink>>>,
        stops: Arc<AtomicU64>,
    }

    impl ScriptedSource {
        fn new(sample_rate_hz: u32, worker: bool) -> (Self, Arc<Mutex<Option<BlockSink>>>) {
            let sink = Arc::new(Mutex::new(None));
            let source = Self {
                sample_rate_hz,
                channels: 1,
                worker,
                sink: Arc::clone(&sink),
                stops: Arc::new(AtomicU64::new(0)),
            };
            (source, sink)
        }
    }

    impl MediaSource for ScriptedSource {
        fn sample_rate_hz(&self) -> u32 {
            self.sample_rate_hz
        }

        fn channel_count(&self) -> u16 {
            self.channels
        }

        fn supports_worker(&self) -> bool {
            self.worker
        }

        fn start(&mut self, sink: BlockSink) -> Result<()> {
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::Relaxed);
            self.sink.lock().unwrap().take();
            Ok(())
        }
    }

    fn push(sink: &Arc<Mutex<Option<BlockSink>>>, block: &[f32]) {
        let mut guard = sink.lock().unwrap();
        if let Some(callback) = guard.as_mut() {
            callback(block);
        }
    }

    #[tokio::test]
    async fn test_inline_strategy_emits_ordered_frames() {
        let caps = pcm_caps();
        let (source, sink) = ScriptedSource::new(16_000, false);
        let mut controller = PcmAudioController::new(8, 64);

        let mut frame_rx = controller.initialize(Box::new(source), &caps).unwrap();
        assert_eq!(
            controller.state().strategy,
            Some(ProcessingStrategy::Inline)
        );

        // Enough input for three full frames plus interpolation slack.
        push(&sink, &vec![0.3f32; 1_000]);

        for expected in 0..3u32 {
            let frame = frame_rx.recv().await.unwrap();
            assert_eq!(frame.sequence_number, expected);
            assert_eq!(frame.sample_count as usize, caps.frame_sample_count);
        }

        controller.stop();
    }

    #[tokio::test]
    async fn test_worker_strategy_emits_ordered_frames() {
        let caps = pcm_caps();
        let (source, sink) = ScriptedSource::new(16_000, true);
        let mut controller = PcmAudioController::new(8, 64);

        let mut frame_rx = controller.initialize(Box::new(source), &caps).unwrap();
        assert_eq!(
            controller.state().strategy,
            Some(ProcessingStrategy::Worker)
        );

        push(&sink, &vec![0.3f32; 1_000]);

        for expected in 0..3u32 {
            let frame = frame_rx.recv().await.unwrap();
            assert_eq!(frame.sequence_number, expected);
        }

        controller.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_resets_session() {
        let caps = pcm_caps();
        let (source, sink) = ScriptedSource::new(16_000, false);
        let mut controller = PcmAudioController::new(8, 64);

        let mut frame_rx = controller.initialize(Box::new(source), &caps).unwrap();
        push(&sink, &vec![0.5f32; 700]);
        assert!(frame_rx.recv().await.is_some());

        controller.stop();
        controller.stop();
        controller.stop();
        assert!(!controller.state().is_capturing);

        // A fresh initialize starts sequence numbers from zero again.
        let (source2, sink2) = ScriptedSource::new(16_000, false);
        let mut frame_rx2 = controller.initialize(Box::new(source2), &caps).unwrap();
        push(&sink2, &vec![0.5f32; 700]);

        let frame = frame_rx2.recv().await.unwrap();
        assert_eq!(frame.sequence_number, 0);

        controller.stop();
    }

    #[tokio::test]
    async fn test_double_initialize_rejected() {
        let caps = pcm_caps();
        let (source, _sink) = ScriptedSource::new(16_000, false);
        let (source2, _sink2) = ScriptedSource::new(16_000, false);
        let mut controller = PcmAudioController::new(8, 64);

        let _frame_rx = controller.initialize(Box::new(source), &caps).unwrap();
        assert!(controller.initialize(Box::new(source2), &caps).is_err());

        controller.stop();
    }

    #[tokio::test]
    async fn test_backpressure_drops_are_counted_not_fatal() {
        let caps = pcm_caps();
        let (source, sink) = ScriptedSource::new(16_000, false);
        // Frame channel of 2: most frames from a big push must drop.
        let mut controller = PcmAudioController::new(8, 2);

        let mut frame_rx = controller.initialize(Box::new(source), &caps).unwrap();
        push(&sink, &vec![0.2f32; 16_000]);

        let first = frame_rx.recv().await.unwrap();
        let second = frame_rx.recv().await.unwrap();
        assert!(second.sequence_number > first.sequence_number);

        let state = controller.state();
        assert!(state.frames_dropped > 0);
        assert!(state.frames_emitted >= 2);

        controller.stop();
    }
}
