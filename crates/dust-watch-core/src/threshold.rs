//! Binarization policies for the thresholding stage.

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// How the binarization threshold is chosen. The active policy is always
/// explicit; fixed and automatic selection are never mixed within one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Global fixed threshold: luminance >= t becomes 255, else 0.
    /// Validated to [0, 255] before any pixel processing.
    Fixed(u32),
    /// Automatic threshold selection by inter-class-variance maximization
    /// over the gray frame's histogram. Binarizes with luminance > t.
    Otsu,
}

/// Binarize with an inclusive comparison: `v >= thresh` becomes 255.
pub fn binarize_at_least(gray: &Frame, thresh: u8) -> Frame {
    binarize(gray, |v| v >= thresh)
}

/// Binarize with a strict comparison: `v > thresh` becomes 255.
///
/// Used by the Otsu policy so that a degenerate single-level frame (where the
/// selected threshold equals that level) maps to all-background.
pub fn binarize_above(gray: &Frame, thresh: u8) -> Frame {
    binarize(gray, |v| v > thresh)
}

fn binarize(gray: &Frame, keep: impl Fn(u8) -> bool) -> Frame {
    let data = gray
        .data
        .iter()
        .map(|&v| if keep(v) { 255 } else { 0 })
        .collect();
    Frame {
        width: gray.width,
        height: gray.height,
        channels: gray.channels,
        data,
    }
}

/// Otsu threshold over the full 256-bin histogram of a gray frame.
pub fn otsu_threshold(gray: &Frame) -> u8 {
    let samples = &gray.data;
    if samples.is_empty() {
        return 127;
    }

    let mut min_v = 255u8;
    let mut max_v = 0u8;
    for &v in samples {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let mut sum_total = 0f64;
    for (i, &h) in hist.iter().enumerate() {
        sum_total += (i as f64) * (h as f64);
    }

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += (t as f64) * (h as f64);
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}
