//! Frame buffers and the dust-coverage detection pipeline.
//!
//! This crate is intentionally small and purely raster-based. It does *not*
//! depend on any image codec or device backend: frames arrive as owned pixel
//! buffers and leave as a coverage ratio plus optional per-stage snapshots.
//!
//! The pipeline isolates airborne/settled particulate by differencing a frame
//! against a denoised copy of itself: stable background survives the median
//! filter, fine dust does not.

mod filter;
mod frame;
mod logger;
mod morphology;
mod pipeline;
mod threshold;

pub use filter::{median_blur, saturating_diff, to_gray};
pub use frame::Frame;
pub use logger::init_with_level;
pub use morphology::{close, dilate, erode};
pub use pipeline::{
    coverage_ratio, detect, detect_with_stages, DetectError, DetectionResult, MorphParams,
    PipelineConfig, STAGE_NAMES,
};
pub use threshold::{binarize_above, binarize_at_least, otsu_threshold, ThresholdPolicy};
