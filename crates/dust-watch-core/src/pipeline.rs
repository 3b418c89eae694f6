//! The coverage-detection pipeline: one color frame in, one scalar out.

use serde::{Deserialize, Serialize};

use crate::filter::{median_blur, saturating_diff, to_gray};
use crate::frame::Frame;
use crate::morphology::close;
use crate::threshold::{binarize_above, binarize_at_least, otsu_threshold, ThresholdPolicy};

/// Errors produced by frame validation and the detection pipeline.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("invalid pipeline configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("invalid input frame: {reason}")]
    InvalidInput { reason: String },
}

/// Parameters for the optional morphological-closing stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphParams {
    /// Structuring element size. Must be odd and positive.
    #[serde(default = "default_morph_kernel")]
    pub kernel_size: usize,
    /// Number of dilate/erode repetitions. Must be positive.
    #[serde(default = "default_morph_iterations")]
    pub iterations: usize,
}

impl Default for MorphParams {
    fn default() -> Self {
        Self {
            kernel_size: default_morph_kernel(),
            iterations: default_morph_iterations(),
        }
    }
}

/// Tunable detection parameters.
///
/// Defaults match the field-tuned values of the reference deployment:
/// 11-pixel median kernel, fixed threshold 32, 5-pixel closing kernel with
/// three iterations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Denoising filter kernel size. Must be odd and positive.
    #[serde(default = "default_noise_kernel")]
    pub noise_kernel_size: usize,
    /// Binarization policy for the threshold stage.
    #[serde(default = "default_threshold")]
    pub threshold: ThresholdPolicy,
    /// Closing-stage parameters; `None` omits the stage entirely and the
    /// ratio is computed on the raw thresholded frame.
    #[serde(default = "default_morph")]
    pub morph: Option<MorphParams>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            noise_kernel_size: default_noise_kernel(),
            threshold: default_threshold(),
            morph: default_morph(),
        }
    }
}

fn default_noise_kernel() -> usize {
    11
}

fn default_threshold() -> ThresholdPolicy {
    ThresholdPolicy::Fixed(32)
}

fn default_morph() -> Option<MorphParams> {
    Some(MorphParams::default())
}

fn default_morph_kernel() -> usize {
    5
}

fn default_morph_iterations() -> usize {
    3
}

impl PipelineConfig {
    /// Reject bad parameters before any pixel processing. A failing config is
    /// never partially applied.
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.noise_kernel_size == 0 || self.noise_kernel_size % 2 == 0 {
            return Err(DetectError::InvalidConfiguration {
                reason: format!(
                    "noise kernel size must be odd and positive (got {})",
                    self.noise_kernel_size
                ),
            });
        }
        if let ThresholdPolicy::Fixed(t) = self.threshold {
            if t > 255 {
                return Err(DetectError::InvalidConfiguration {
                    reason: format!("threshold must be within [0, 255] (got {t})"),
                });
            }
        }
        if let Some(morph) = &self.morph {
            if morph.kernel_size == 0 || morph.kernel_size % 2 == 0 {
                return Err(DetectError::InvalidConfiguration {
                    reason: format!(
                        "morphological kernel size must be odd and positive (got {})",
                        morph.kernel_size
                    ),
                });
            }
            if morph.iterations == 0 {
                return Err(DetectError::InvalidConfiguration {
                    reason: "morphological iteration count must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Stable stage names, in canonical pipeline order. The `"morph"` entry is
/// present only when closing parameters are supplied.
pub const STAGE_NAMES: [&str; 6] = [
    "original",
    "denoise",
    "difference",
    "grayscale",
    "threshold",
    "morph",
];

/// Output of one detection run.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    /// Fraction of the final binary frame's pixels valued 255, in [0, 1].
    pub coverage_ratio: f64,
    /// Threshold actually used by the binarization stage. For the fixed
    /// policy this echoes the configured value; for Otsu it reports the
    /// selected one.
    pub applied_threshold: u8,
    /// One `(name, frame)` entry per executed stage, in pipeline order.
    /// Empty unless stage capture was requested.
    pub stages: Vec<(&'static str, Frame)>,
}

/// Fraction of samples valued exactly 255 over the total sample count.
///
/// Returns 0 for an empty buffer so the metric never divides by zero.
pub fn coverage_ratio(frame: &Frame) -> f64 {
    if frame.data.is_empty() {
        return 0.0;
    }
    let on = frame.data.iter().filter(|&&v| v == 255).count();
    on as f64 / frame.data.len() as f64
}

/// Run the detection pipeline without recording intermediate frames.
pub fn detect(frame: &Frame, config: &PipelineConfig) -> Result<DetectionResult, DetectError> {
    run(frame, config, false)
}

/// Run the detection pipeline, recording every executed stage.
pub fn detect_with_stages(
    frame: &Frame,
    config: &PipelineConfig,
) -> Result<DetectionResult, DetectError> {
    run(frame, config, true)
}

fn run(
    frame: &Frame,
    config: &PipelineConfig,
    capture_stages: bool,
) -> Result<DetectionResult, DetectError> {
    config.validate()?;
    validate_frame(frame)?;

    let mut stages: Vec<(&'static str, Frame)> = Vec::new();
    let mut record = |name: &'static str, stage: &Frame| {
        if capture_stages {
            stages.push((name, stage.clone()));
        }
    };

    record("original", frame);

    let denoised = median_blur(frame, config.noise_kernel_size);
    record("denoise", &denoised);

    let diff = saturating_diff(frame, &denoised);
    record("difference", &diff);

    let gray = to_gray(&diff);
    record("grayscale", &gray);

    let (applied_threshold, thresh) = match config.threshold {
        ThresholdPolicy::Fixed(t) => {
            let t = t as u8; // validated to [0, 255] above
            (t, binarize_at_least(&gray, t))
        }
        ThresholdPolicy::Otsu => {
            let t = otsu_threshold(&gray);
            (t, binarize_above(&gray, t))
        }
    };
    record("threshold", &thresh);

    let binary = match &config.morph {
        Some(morph) => {
            let closed = close(&thresh, morph.kernel_size, morph.iterations);
            record("morph", &closed);
            closed
        }
        None => thresh,
    };

    let ratio = coverage_ratio(&binary);
    log::debug!(
        "detection complete: coverage {:.4}, threshold {applied_threshold}",
        ratio
    );

    Ok(DetectionResult {
        coverage_ratio: ratio,
        applied_threshold,
        stages,
    })
}

fn validate_frame(frame: &Frame) -> Result<(), DetectError> {
    if frame.width == 0 || frame.height == 0 || frame.data.is_empty() {
        return Err(DetectError::InvalidInput {
            reason: "empty frame".to_string(),
        });
    }
    if frame.channels != 1 && frame.channels != 3 {
        return Err(DetectError::InvalidInput {
            reason: format!(
                "unsupported channel count {} (expected 1 or 3)",
                frame.channels
            ),
        });
    }
    let expected = frame.width * frame.height * frame.channels;
    if frame.data.len() != expected {
        return Err(DetectError::InvalidInput {
            reason: format!(
                "frame buffer length mismatch (expected {expected} bytes, got {})",
                frame.data.len()
            ),
        });
    }
    Ok(())
}
