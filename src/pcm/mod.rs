//! PCM framing pipeline
//!
//! Raw multi-channel blocks from the audio callback become fixed 20ms
//! mono frames here:
//! - `MonoResampler`: downmix + linear-interpolation rate conversion
//! - `FrameProcessor`: fixed-size framing with monotonic sequencing
//!
//! Both controller strategies share this one implementation; there is
//! deliberately no second copy of the resampling logic.

pub mod frame;
pub mod processor;
pub mod resampler;

pub use frame::{PcmFrame, SampleFormat};
pub use processor::FrameProcessor;
pub use resampler::MonoResampler;
