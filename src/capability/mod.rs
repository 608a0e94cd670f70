//! Encoder capability negotiation
//!
//! This module resolves what the runtime can encode before a recording
//! session starts:
//! - Codec ladder probing (most specific codec first)
//! - PCM fallback when no encoder is available (never an error)
//! - Chunk interval recommendation from device form factor

mod negotiator;

pub use negotiator::{
    negotiate, AudioCapabilities, CodecSpec, DeviceHints, EncoderRegistry, FormFactor,
    CODEC_LADDER, PCM_FALLBACK_FRAME_DURATION_MS, PCM_FALLBACK_SAMPLE_RATE_HZ,
};
