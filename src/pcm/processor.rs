use std::time::Instant;

use super::frame::PcmFrame;
use super::resampler::MonoResampler;
use crate::capability::AudioCapabilities;

/// Turns raw audio blocks into fixed-duration mono frames.
///
/// Runs wherever the controller placed it: on a dedicated worker thread
/// or inline in the audio callback. Either way it must stay
/// non-blocking, so all it does per block is downmix, resample, and
/// slice full frames off the pending buffer.
#[derive(Debug)]
pub struct FrameProcessor {
    resampler: MonoResampler,
    /// Resampled samples not yet sliced into a frame
    pending: Vec<f32>,
    /// Conversion scratch, reused across frames
    scratch: Vec<i16>,
    frame_sample_count: usize,
    frame_duration_ms: u16,
    target_rate_hz: u32,
    next_sequence: u32,
    /// Session-local monotonic epoch for capture timestamps
    epoch: Instant,
}

impl FrameProcessor {
    pub fn new(input_rate_hz: u32, caps: &AudioCapabilities) -> Self {
        Self::with_buffer_hint(input_rate_hz, caps, caps.frame_sample_count * 4)
    }

    /// The inline strategy runs in larger callback intervals and wants a
    /// bigger intermediate buffer up front.
    pub fn with_buffer_hint(
        input_rate_hz: u32,
        caps: &AudioCapabilities,
        buffer_hint: usize,
    ) -> Self {
        Self {
            resampler: MonoResampler::new(input_rate_hz, caps.sample_rate_hz),
            pending: Vec::with_capacity(buffer_hint),
            scratch: Vec::with_capacity(caps.frame_sample_count),
            frame_sample_count: caps.frame_sample_count,
            frame_duration_ms: caps.frame_duration_ms as u16,
            target_rate_hz: caps.sample_rate_hz,
            next_sequence: 0,
            epoch: Instant::now(),
        }
    }

    /// Consume one raw block and append any completed frames to `out`.
    ///
    /// The remainder below one frame stays pending for the next block;
    /// no sample is dropped or duplicated across frame boundaries.
    pub fn process_block(&mut self, block: &[f32], channels: u16, out: &mut Vec<PcmFrame>) {
        self.resampler.push_interleaved(block, channels);
        self.resampler.resample_into(&mut self.pending);

        while self.pending.len() >= self.frame_sample_count {
            self.scratch.clear();
            self.scratch.extend(
                self.pending[..self.frame_sample_count]
                    .iter()
                    .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
            );
            self.pending.drain(..self.frame_sample_count);

            let timestamp_ms = self.epoch.elapsed().as_secs_f64() * 1_000.0;
            out.push(PcmFrame::from_samples(
                &self.scratch,
                self.next_sequence,
                timestamp_ms,
                self.target_rate_hz,
                self.frame_duration_ms,
            ));
            self.next_sequence += 1;
        }
    }

    /// Zero buffers, position, and sequence for a fresh session.
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.pending.clear();
        self.next_sequence = 0;
        self.epoch = Instant::now();
    }

    pub fn frames_emitted(&self) -> u32 {
        self.next_sequence
    }
}
