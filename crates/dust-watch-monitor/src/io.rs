//! Collaborator seams consumed by the control loop.

use std::path::{Path, PathBuf};
use std::time::Instant;

use dust_watch_core::Frame;

/// Frame acquisition failed. Non-fatal to the loop; the scan is skipped and
/// retried on the next window.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("frame capture failed: {reason}")]
pub struct CaptureError {
    pub reason: String,
}

/// An alarm output could not be driven. Reported, never fatal: a stuck
/// indicator must not halt detection.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to drive alarm output '{output}': {reason}")]
pub struct ActuatorError {
    pub output: &'static str,
    pub reason: String,
}

/// A stage snapshot could not be persisted. Swallowed after logging; never
/// affects the coverage ratio or the alarm decision.
#[derive(thiserror::Error, Debug)]
#[error("failed to write frame to {path:?}: {reason}")]
pub struct WriteError {
    pub path: PathBuf,
    pub reason: String,
}

/// Produces one frame on demand at the requested resolution.
///
/// Implementations may block for a fixed device warm-up delay before the
/// first usable frame; the loop tolerates this since capture is synchronous
/// by design.
pub trait FrameSource {
    fn capture(&mut self, resolution: (u32, u32)) -> Result<Frame, CaptureError>;
}

/// Two independent binary outputs plus the polled manual-reset input.
pub trait AlarmActuator {
    fn set_indicator(&mut self, on: bool) -> Result<(), ActuatorError>;
    fn set_audible(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Non-blocking poll of the momentary reset input. Observing the request
    /// consumes it.
    fn reset_requested(&mut self) -> bool;
}

/// Persists one pipeline-stage frame to a path.
pub trait FrameWriter {
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<(), WriteError>;
}

/// Monotonic time source. A seam so loop timing is testable.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
