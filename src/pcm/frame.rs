/// Sample formats that can travel in a frame payload.
///
/// Only 16-bit signed little-endian PCM is defined today; the wire
/// format carries the code so decoders can reject anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Pcm16Le,
}

impl SampleFormat {
    pub fn code(self) -> u16 {
        match self {
            SampleFormat::Pcm16Le => 1,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(SampleFormat::Pcm16Le),
            _ => None,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Pcm16Le => 2,
        }
    }
}

/// One fixed-duration slice of resampled mono audio.
///
/// Frames are produced in strictly increasing sequence order within a
/// session and must reach the wire in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmFrame {
    /// Monotonic counter, starts at 0 per session
    pub sequence_number: u32,
    /// Monotonic clock at frame completion, ms since the session epoch
    pub capture_timestamp_ms: f64,
    /// Sample rate in Hz
    pub sample_rate_hz: u32,
    /// Frame duration in milliseconds
    pub frame_duration_ms: u16,
    /// Number of samples in the payload
    pub sample_count: u16,
    /// Number of channels (always 1 after downmix)
    pub channel_count: u16,
    /// Payload sample format
    pub format: SampleFormat,
    /// Raw sample bytes
    pub payload: Vec<u8>,
}

impl PcmFrame {
    /// Build a frame from mono i16 samples.
    pub fn from_samples(
        samples: &[i16],
        sequence_number: u32,
        capture_timestamp_ms: f64,
        sample_rate_hz: u32,
        frame_duration_ms: u16,
    ) -> Self {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        Self {
            sequence_number,
            capture_timestamp_ms,
            sample_rate_hz,
            frame_duration_ms,
            sample_count: samples.len() as u16,
            channel_count: 1,
            format: SampleFormat::Pcm16Le,
            payload,
        }
    }

    /// Payload length must equal sample_count * bytes_per_sample.
    pub fn payload_is_consistent(&self) -> bool {
        self.payload.len() == self.sample_count as usize * self.format.bytes_per_sample()
    }

    /// Decode the payload back to i16 samples.
    pub fn samples(&self) -> Vec<i16> {
        self.payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}
