use tracing::debug;

/// How many consumed input samples may accumulate before the mono
/// buffer is compacted. Compaction is a memmove, so it is amortized
/// rather than per-callback.
const COMPACT_THRESHOLD: usize = 8_192;

/// Streaming mono resampler.
///
/// Incoming interleaved blocks are downmixed to mono by averaging
/// channels sample-by-sample, appended to a running buffer, and read
/// out through linear interpolation on a fractional position that
/// advances by `input_rate / target_rate` per output sample. This keeps
/// per-sample cost O(1) and avoids the quality cliff of plain
/// decimation.
#[derive(Debug)]
pub struct MonoResampler {
    input_rate_hz: u32,
    target_rate_hz: u32,
    /// Input samples consumed per output sample
    step: f64,
    /// Running mono input buffer
    mono: Vec<f32>,
    /// Fractional read position into `mono`
    position: f64,
}

impl MonoResampler {
    pub fn new(input_rate_hz: u32, target_rate_hz: u32) -> Self {
        debug!(
            "Mono resampler: {}Hz -> {}Hz",
            input_rate_hz, target_rate_hz
        );

        Self {
            input_rate_hz,
            target_rate_hz,
            step: input_rate_hz as f64 / target_rate_hz as f64,
            mono: Vec::new(),
            position: 0.0,
        }
    }

    /// Downmix one interleaved block to mono and append it.
    ///
    /// Called from the audio callback; appends are the only allocation
    /// and they amortize.
    pub fn push_interleaved(&mut self, block: &[f32], channels: u16) {
        if channels <= 1 {
            self.mono.extend_from_slice(block);
            return;
        }

        let channels = channels as usize;
        self.mono.reserve(block.len() / channels);
        for group in block.chunks_exact(channels) {
            let sum: f32 = group.iter().sum();
            self.mono.push(sum / channels as f32);
        }
    }

    /// Drain every output sample currently derivable from the buffer.
    ///
    /// Interpolation needs one sample of lookahead, so the last input
    /// sample stays buffered until its successor arrives; nothing is
    /// dropped or duplicated across calls.
    pub fn resample_into(&mut self, out: &mut Vec<f32>) {
        while (self.position as usize) + 1 < self.mono.len() {
            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let sample = self.mono[index] * (1.0 - frac) + self.mono[index + 1] * frac;
            out.push(sample);
            self.position += self.step;
        }

        self.compact();
    }

    /// Discard fully-consumed input samples to bound memory.
    fn compact(&mut self) {
        let consumed = self.position as usize;
        if consumed >= COMPACT_THRESHOLD {
            self.mono.drain(..consumed);
            self.position -= consumed as f64;
        }
    }

    /// Zero all buffers and positions for a fresh session.
    pub fn reset(&mut self) {
        self.mono.clear();
        self.position = 0.0;
    }

    pub fn input_rate_hz(&self) -> u32 {
        self.input_rate_hz
    }

    pub fn target_rate_hz(&self) -> u32 {
        self.target_rate_hz
    }

    /// Input samples currently buffered (consumed but not yet compacted
    /// samples included).
    pub fn buffered_input_samples(&self) -> usize {
        self.mono.len()
    }
}
