//! Capture session facade
//!
//! One `CaptureSession` per recording attempt. The external session
//! manager owns the phase machine (`idle -> starting -> active <->
//! suspended -> stopping -> idle`); this module exposes the hooks those
//! transitions call and wires the pipeline together:
//! - Capability negotiation and controller setup on start
//! - Transport, timer, and monitor tasks for the session's lifetime
//! - Transcript activity feed and session statistics

mod session;
mod stats;

pub use session::CaptureSession;
pub use stats::SessionStats;
