use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use dust_watch_core::{DetectError, PipelineConfig};

/// Errors produced by monitor configuration validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("scan interval must be at least 1 second (got {got})")]
    InvalidScanInterval { got: u64 },

    #[error("coverage threshold must be within [0, 100] percent (got {got})")]
    InvalidCoverageThreshold { got: f64 },

    #[error("capture resolution must be non-zero (got {width}x{height})")]
    InvalidResolution { width: u32, height: u32 },

    #[error(transparent)]
    Pipeline(#[from] DetectError),
}

/// Runtime settings for the control loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between permitted detection attempts while not alarmed.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Coverage percentage at or above which the alarm activates.
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold_percent: f64,
    /// Resolution requested from the frame source.
    #[serde(default = "default_resolution")]
    pub resolution: (u32, u32),
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// When set, every scan writes its stage frames here as timestamped
    /// snapshots for later inspection.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            coverage_threshold_percent: default_coverage_threshold(),
            resolution: default_resolution(),
            pipeline: PipelineConfig::default(),
            snapshot_dir: None,
        }
    }
}

fn default_scan_interval() -> u64 {
    60
}

fn default_coverage_threshold() -> f64 {
    5.0
}

fn default_resolution() -> (u32, u32) {
    (1024, 768)
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_secs < 1 {
            return Err(ConfigError::InvalidScanInterval {
                got: self.scan_interval_secs,
            });
        }
        if !(0.0..=100.0).contains(&self.coverage_threshold_percent)
            || self.coverage_threshold_percent.is_nan()
        {
            return Err(ConfigError::InvalidCoverageThreshold {
                got: self.coverage_threshold_percent,
            });
        }
        let (width, height) = self.resolution;
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidResolution { width, height });
        }
        self.pipeline.validate()?;
        Ok(())
    }
}
