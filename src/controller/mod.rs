//! PCM audio controller
//!
//! Owns the frame processor's lifecycle. At initialize time it picks
//! one of two execution strategies and never switches mid-session:
//! - `Worker`: a dedicated thread hosts the processor, insulated from
//!   control-thread jank; the audio callback only hands blocks over a
//!   bounded channel.
//! - `Inline`: processing runs directly in the block callback with a
//!   larger intermediate buffer, for sources without an isolated
//!   execution context.

mod controller;

pub use controller::{
    BlockSink, ControllerState, MediaSource, PcmAudioController, ProcessingStrategy,
};
