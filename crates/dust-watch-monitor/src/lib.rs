//! Scan/alarm control loop for the dust-watch monitor.
//!
//! One logical task, no concurrency: the loop polls a clock, pulls a frame,
//! runs the detection pipeline, drives the alarm outputs, and watches for a
//! manual reset. Camera, actuator, snapshot writer, and clock are collaborator
//! traits so deployments (and tests) supply their own.

mod config;
mod io;
mod monitor;

pub use config::{ConfigError, MonitorConfig};
pub use io::{
    ActuatorError, AlarmActuator, CaptureError, Clock, FrameSource, FrameWriter, SystemClock,
    WriteError,
};
pub use monitor::{LoopState, Monitor, ScanOutcome, Tick};
