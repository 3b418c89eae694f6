//! The control-loop state machine.
//!
//! Strictly single-threaded: capture and detection block the loop for their
//! duration, which guarantees at most one detection run in flight with no
//! locking. Reset responsiveness is therefore bounded by the longest blocking
//! operation, not by a tick rate.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dust_watch_core::{detect, detect_with_stages, DetectionResult, Frame};

use crate::config::{ConfigError, MonitorConfig};
use crate::io::{AlarmActuator, Clock, FrameSource, FrameWriter};

/// Pause between loop iterations when nothing is due, so the poll does not
/// spin a core.
const IDLE_POLL_PERIOD: Duration = Duration::from_millis(50);

/// Observable loop states between iterations.
///
/// Scanning is not listed: capture plus detection run synchronously inside
/// one `step`, so the loop can only ever be observed waiting or alarmed.
/// A scan that ran is reported through `Tick::Scan`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AlarmActive,
}

/// What one loop iteration did.
#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    /// Nothing due; no state change.
    Idle,
    /// Manual reset observed while alarmed: outputs cleared, window restarted.
    AlarmReset,
    /// A scan fired.
    Scan(ScanOutcome),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScanOutcome {
    /// Coverage below threshold; back to waiting.
    BelowThreshold { coverage_ratio: f64 },
    /// Coverage at or above threshold; both outputs asserted.
    AlarmRaised { coverage_ratio: f64 },
    /// Capture or detection failed. Logged, alarm state untouched, retried
    /// on the next window.
    Failed { reason: String },
}

/// The monitor loop: polls the clock, sequences capture + detection, drives
/// the alarm, and honors the manual reset.
pub struct Monitor<S, A, W, C> {
    config: MonitorConfig,
    source: S,
    actuator: A,
    writer: W,
    clock: C,
    alarm_active: bool,
    window_start: Instant,
}

impl<S, A, W, C> Monitor<S, A, W, C>
where
    S: FrameSource,
    A: AlarmActuator,
    W: FrameWriter,
    C: Clock,
{
    /// Validates the configuration and starts the first scan window at the
    /// current clock reading.
    pub fn new(
        config: MonitorConfig,
        source: S,
        actuator: A,
        writer: W,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let window_start = clock.now();
        Ok(Self {
            config,
            source,
            actuator,
            writer,
            clock,
            alarm_active: false,
            window_start,
        })
    }

    pub fn state(&self) -> LoopState {
        if self.alarm_active {
            LoopState::AlarmActive
        } else {
            LoopState::Idle
        }
    }

    pub fn alarm_active(&self) -> bool {
        self.alarm_active
    }

    /// Run the loop until externally terminated.
    pub fn run(&mut self) -> ! {
        log::info!(
            "monitor started: scanning every {}s, alarm at {:.2}% coverage",
            self.config.scan_interval_secs,
            self.config.coverage_threshold_percent
        );
        loop {
            if matches!(self.step(), Tick::Idle) {
                std::thread::sleep(IDLE_POLL_PERIOD);
            }
        }
    }

    /// One loop iteration. The reset input is polled every iteration
    /// regardless of state; a scan fires only while not alarmed and only once
    /// the interval has elapsed since the window start.
    pub fn step(&mut self) -> Tick {
        let now = self.clock.now();

        if self.actuator.reset_requested() {
            if self.alarm_active {
                log::info!("reset observed: silencing alarm and restarting scan window");
                self.alarm_active = false;
                self.drive_outputs(false);
                self.window_start = now;
                return Tick::AlarmReset;
            }
            // no-op outside AlarmActive
        }

        let interval = Duration::from_secs(self.config.scan_interval_secs);
        if !self.alarm_active && now.duration_since(self.window_start) >= interval {
            // fixed cadence: the window restarts when the scan fires, so a
            // failed scan still consumes its window
            self.window_start = now;
            return Tick::Scan(self.scan());
        }

        Tick::Idle
    }

    fn scan(&mut self) -> ScanOutcome {
        log::info!("scanning area for dust");

        let frame = match self.source.capture(self.config.resolution) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("{err}");
                return ScanOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let result = match self.run_pipeline(&frame) {
            Ok(result) => result,
            Err(reason) => {
                log::error!("detection failed: {reason}");
                return ScanOutcome::Failed { reason };
            }
        };

        self.write_snapshots(&result.stages);

        let ratio = result.coverage_ratio;
        log::info!("dust detected at {:.2}% coverage", ratio * 100.0);

        if ratio >= self.config.coverage_threshold_percent / 100.0 {
            log::warn!("dust coverage exceeds threshold: activating alarm");
            self.alarm_active = true;
            self.drive_outputs(true);
            ScanOutcome::AlarmRaised {
                coverage_ratio: ratio,
            }
        } else {
            ScanOutcome::BelowThreshold {
                coverage_ratio: ratio,
            }
        }
    }

    fn run_pipeline(&self, frame: &Frame) -> Result<DetectionResult, String> {
        let result = if self.config.snapshot_dir.is_some() {
            detect_with_stages(frame, &self.config.pipeline)
        } else {
            detect(frame, &self.config.pipeline)
        };
        result.map_err(|err| err.to_string())
    }

    fn drive_outputs(&mut self, on: bool) {
        if let Err(err) = self.actuator.set_indicator(on) {
            log::error!("{err}");
        }
        if let Err(err) = self.actuator.set_audible(on) {
            log::error!("{err}");
        }
    }

    fn write_snapshots(&mut self, stages: &[(&'static str, Frame)]) {
        let Some(dir) = &self.config.snapshot_dir else {
            return;
        };
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for (index, (name, frame)) in stages.iter().enumerate() {
            let path = dir.join(format!("{stamp}_{index:02}_{name}.png"));
            if let Err(err) = self.writer.write(frame, &path) {
                log::warn!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ActuatorError, CaptureError, WriteError};
    use dust_watch_core::PipelineConfig;
    use std::cell::{Cell, RefCell};
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct FakeClock {
        offset: Rc<Cell<Duration>>,
        base: Rc<Cell<Option<Instant>>>,
    }

    impl FakeClock {
        fn advance(&self, secs: u64) {
            self.offset.set(self.offset.get() + Duration::from_secs(secs));
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            if self.base.get().is_none() {
                self.base.set(Some(Instant::now()));
            }
            self.base.get().unwrap() + self.offset.get()
        }
    }

    /// Returns the same frame on every capture, or fails on demand.
    struct FakeSource {
        frame: Frame,
        fail: Rc<Cell<bool>>,
        captures: Rc<Cell<usize>>,
    }

    impl FrameSource for FakeSource {
        fn capture(&mut self, _resolution: (u32, u32)) -> Result<Frame, CaptureError> {
            if self.fail.get() {
                return Err(CaptureError {
                    reason: "device unavailable".to_string(),
                });
            }
            self.captures.set(self.captures.get() + 1);
            Ok(self.frame.clone())
        }
    }

    #[derive(Clone, Default)]
    struct FakeActuator {
        indicator: Rc<Cell<bool>>,
        audible: Rc<Cell<bool>>,
        reset_pending: Rc<Cell<bool>>,
    }

    impl AlarmActuator for FakeActuator {
        fn set_indicator(&mut self, on: bool) -> Result<(), ActuatorError> {
            self.indicator.set(on);
            Ok(())
        }

        fn set_audible(&mut self, on: bool) -> Result<(), ActuatorError> {
            self.audible.set(on);
            Ok(())
        }

        fn reset_requested(&mut self) -> bool {
            self.reset_pending.replace(false)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingWriter {
        paths: Rc<RefCell<Vec<PathBuf>>>,
        fail: bool,
    }

    impl FrameWriter for RecordingWriter {
        fn write(&mut self, _frame: &Frame, path: &Path) -> Result<(), WriteError> {
            if self.fail {
                return Err(WriteError {
                    path: path.to_path_buf(),
                    reason: "disk full".to_string(),
                });
            }
            self.paths.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    /// Mid-gray frame with enough isolated bright specks to exceed a 5%
    /// coverage threshold after closing.
    fn dusty_frame() -> Frame {
        let mut frame = Frame::filled(32, 32, 3, 128);
        for y in (2..30).step_by(4) {
            for x in (2..30).step_by(4) {
                for c in 0..3 {
                    frame.put(x, y, c, 255);
                }
            }
        }
        frame
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            scan_interval_secs: 5,
            coverage_threshold_percent: 5.0,
            resolution: (32, 32),
            pipeline: PipelineConfig {
                noise_kernel_size: 3,
                ..PipelineConfig::default()
            },
            snapshot_dir: None,
        }
    }

    struct Rig {
        monitor: Monitor<FakeSource, FakeActuator, RecordingWriter, FakeClock>,
        clock: FakeClock,
        actuator: FakeActuator,
        fail_capture: Rc<Cell<bool>>,
        captures: Rc<Cell<usize>>,
        written: Rc<RefCell<Vec<PathBuf>>>,
    }

    fn rig_with(config: MonitorConfig, frame: Frame, failing_writer: bool) -> Rig {
        let clock = FakeClock::default();
        let actuator = FakeActuator::default();
        let fail_capture = Rc::new(Cell::new(false));
        let captures = Rc::new(Cell::new(0));
        let source = FakeSource {
            frame,
            fail: fail_capture.clone(),
            captures: captures.clone(),
        };
        let writer = RecordingWriter {
            paths: Rc::new(RefCell::new(Vec::new())),
            fail: failing_writer,
        };
        let written = writer.paths.clone();
        let monitor =
            Monitor::new(config, source, actuator.clone(), writer, clock.clone()).unwrap();
        Rig {
            monitor,
            clock,
            actuator,
            fail_capture,
            captures,
            written,
        }
    }

    fn rig() -> Rig {
        rig_with(test_config(), dusty_frame(), false)
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = test_config();
        config.scan_interval_secs = 0;
        let clock = FakeClock::default();
        let source = FakeSource {
            frame: dusty_frame(),
            fail: Rc::new(Cell::new(false)),
            captures: Rc::new(Cell::new(0)),
        };
        let result = Monitor::new(
            config,
            source,
            FakeActuator::default(),
            RecordingWriter::default(),
            clock,
        );
        assert!(matches!(result, Err(ConfigError::InvalidScanInterval { .. })));
    }

    #[test]
    fn state_reports_only_resting_states() {
        let mut rig = rig();
        assert_eq!(rig.monitor.state(), LoopState::Idle);
        rig.clock.advance(5);
        // scan activity surfaces through the tick, not through state()
        assert!(matches!(rig.monitor.step(), Tick::Scan(_)));
        assert_eq!(rig.monitor.state(), LoopState::AlarmActive);
    }

    #[test]
    fn nothing_fires_before_interval_elapses() {
        let mut rig = rig();
        assert_eq!(rig.monitor.step(), Tick::Idle);
        rig.clock.advance(4);
        assert_eq!(rig.monitor.step(), Tick::Idle);
        assert_eq!(rig.captures.get(), 0);
    }

    #[test]
    fn high_coverage_raises_alarm_and_asserts_outputs() {
        let mut rig = rig();
        rig.clock.advance(5);
        let tick = rig.monitor.step();
        match tick {
            Tick::Scan(ScanOutcome::AlarmRaised { coverage_ratio }) => {
                assert!(coverage_ratio >= 0.05, "ratio {coverage_ratio}");
            }
            other => panic!("expected alarm, got {other:?}"),
        }
        assert_eq!(rig.monitor.state(), LoopState::AlarmActive);
        assert!(rig.actuator.indicator.get());
        assert!(rig.actuator.audible.get());

        // outputs stay asserted and no further scans fire until reset
        rig.clock.advance(60);
        assert_eq!(rig.monitor.step(), Tick::Idle);
        assert!(rig.actuator.indicator.get());
        assert_eq!(rig.captures.get(), 1);
    }

    #[test]
    fn quiet_frame_stays_idle() {
        let mut rig = rig_with(test_config(), Frame::filled(32, 32, 3, 128), false);
        rig.clock.advance(5);
        match rig.monitor.step() {
            Tick::Scan(ScanOutcome::BelowThreshold { coverage_ratio }) => {
                assert_eq!(coverage_ratio, 0.0);
            }
            other => panic!("expected below-threshold scan, got {other:?}"),
        }
        assert_eq!(rig.monitor.state(), LoopState::Idle);
        assert!(!rig.actuator.indicator.get());
    }

    #[test]
    fn reset_clears_alarm_and_restarts_window() {
        let mut rig = rig();
        rig.clock.advance(5);
        rig.monitor.step();
        assert!(rig.monitor.alarm_active());

        // reset wins even though a scan would otherwise be due
        rig.clock.advance(60);
        rig.actuator.reset_pending.set(true);
        assert_eq!(rig.monitor.step(), Tick::AlarmReset);
        assert_eq!(rig.monitor.state(), LoopState::Idle);
        assert!(!rig.actuator.indicator.get());
        assert!(!rig.actuator.audible.get());

        // window restarted at the reset, so the next scan waits a full interval
        rig.clock.advance(4);
        assert_eq!(rig.monitor.step(), Tick::Idle);
        rig.clock.advance(1);
        assert!(matches!(rig.monitor.step(), Tick::Scan(_)));
    }

    #[test]
    fn reset_is_noop_while_idle() {
        let mut rig = rig();
        rig.clock.advance(2);
        rig.actuator.reset_pending.set(true);
        assert_eq!(rig.monitor.step(), Tick::Idle);
        assert_eq!(rig.monitor.state(), LoopState::Idle);
        // the window was not restarted
        rig.clock.advance(3);
        assert!(matches!(rig.monitor.step(), Tick::Scan(_)));
    }

    #[test]
    fn capture_failure_is_nonfatal_and_retried_next_window() {
        let mut rig = rig();
        rig.fail_capture.set(true);
        rig.clock.advance(5);
        match rig.monitor.step() {
            Tick::Scan(ScanOutcome::Failed { reason }) => {
                assert!(reason.contains("capture"), "reason: {reason}");
            }
            other => panic!("expected failed scan, got {other:?}"),
        }
        assert!(!rig.monitor.alarm_active());
        assert_eq!(rig.monitor.state(), LoopState::Idle);

        // failed scan consumed its window
        rig.clock.advance(1);
        assert_eq!(rig.monitor.step(), Tick::Idle);

        rig.fail_capture.set(false);
        rig.clock.advance(4);
        assert!(matches!(rig.monitor.step(), Tick::Scan(_)));
    }

    #[test]
    fn invalid_pipeline_input_is_nonfatal() {
        // a 2-channel frame slips past capture but fails pipeline validation
        let malformed = Frame {
            width: 8,
            height: 8,
            channels: 2,
            data: vec![0; 128],
        };
        let mut rig = rig_with(test_config(), malformed, false);
        rig.clock.advance(5);
        assert!(matches!(
            rig.monitor.step(),
            Tick::Scan(ScanOutcome::Failed { .. })
        ));
        assert!(!rig.monitor.alarm_active());
    }

    #[test]
    fn fixed_cadence_does_not_double_fire() {
        let mut rig = rig_with(test_config(), Frame::filled(32, 32, 3, 128), false);
        rig.clock.advance(5);
        assert!(matches!(rig.monitor.step(), Tick::Scan(_)));
        rig.clock.advance(1);
        assert_eq!(rig.monitor.step(), Tick::Idle);
        rig.clock.advance(4);
        assert!(matches!(rig.monitor.step(), Tick::Scan(_)));
        assert_eq!(rig.captures.get(), 2);
    }

    #[test]
    fn snapshots_written_per_stage_in_order() {
        let mut config = test_config();
        config.snapshot_dir = Some(PathBuf::from("/tmp/dust-watch-snapshots"));
        let mut rig = rig_with(config, dusty_frame(), false);
        rig.clock.advance(5);
        rig.monitor.step();

        let written = rig.written.borrow();
        assert_eq!(written.len(), 6);
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names[0].ends_with("_00_original.png"), "{}", names[0]);
        assert!(names[5].ends_with("_05_morph.png"), "{}", names[5]);
    }

    #[test]
    fn write_failure_does_not_change_scan_outcome() {
        let mut config = test_config();
        config.snapshot_dir = Some(PathBuf::from("/tmp/dust-watch-snapshots"));
        let mut rig = rig_with(config, dusty_frame(), true);
        rig.clock.advance(5);
        assert!(matches!(
            rig.monitor.step(),
            Tick::Scan(ScanOutcome::AlarmRaised { .. })
        ));
        assert!(rig.written.borrow().is_empty());
    }
}
