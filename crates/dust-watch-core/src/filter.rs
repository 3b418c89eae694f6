//! Spatial filters used by the detection pipeline: median denoising,
//! clamped frame differencing, and luma reduction.

use crate::frame::Frame;

/// Per-channel k×k median filter with border-replicate sampling.
///
/// The kernel size must be odd and positive; the pipeline validates this
/// before any pixel work.
pub fn median_blur(src: &Frame, ksize: usize) -> Frame {
    debug_assert!(ksize % 2 == 1 && ksize > 0);
    let radius = (ksize / 2) as i64;
    let mut out = Frame::filled(src.width, src.height, src.channels, 0);
    let mut window = Vec::with_capacity(ksize * ksize);

    for y in 0..src.height {
        for x in 0..src.width {
            for c in 0..src.channels {
                window.clear();
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        window.push(src.sample_clamped(x as i64 + dx, y as i64 + dy, c));
                    }
                }
                window.sort_unstable();
                out.put(x, y, c, window[window.len() / 2]);
            }
        }
    }
    out
}

/// Per-channel `a - b` clamped at zero, no wraparound.
///
/// Both frames must share the same shape; the pipeline guarantees this since
/// `b` is always a filtered copy of `a`.
pub fn saturating_diff(a: &Frame, b: &Frame) -> Frame {
    debug_assert_eq!((a.width, a.height, a.channels), (b.width, b.height, b.channels));
    let data = a
        .data
        .iter()
        .zip(b.data.iter())
        .map(|(&pa, &pb)| pa.saturating_sub(pb))
        .collect();
    Frame {
        width: a.width,
        height: a.height,
        channels: a.channels,
        data,
    }
}

/// Collapse a color frame to one luminance channel with the standard luma
/// weights (0.299 R + 0.587 G + 0.114 B). A 1-channel frame passes through
/// unchanged.
pub fn to_gray(src: &Frame) -> Frame {
    if !src.is_color() {
        return src.clone();
    }
    let mut data = Vec::with_capacity(src.pixel_count());
    for px in src.data.chunks_exact(3) {
        let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
        data.push(luma.round().clamp(0.0, 255.0) as u8);
    }
    Frame {
        width: src.width,
        height: src.height,
        channels: 1,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_constant_field_is_the_field() {
        let src = Frame::filled(5, 5, 3, 90);
        let out = median_blur(&src, 3);
        assert_eq!(out, src);
    }

    #[test]
    fn median_removes_isolated_speck() {
        let mut src = Frame::filled(5, 5, 1, 0);
        src.put(2, 2, 0, 255);
        let out = median_blur(&src, 3);
        assert!(out.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn median_window_clamps_on_tiny_frame() {
        let src = Frame::new(1, 1, 1, vec![77]).unwrap();
        let out = median_blur(&src, 11);
        assert_eq!(out.get(0, 0, 0), 77);
    }

    #[test]
    fn diff_clamps_at_zero() {
        let a = Frame::new(2, 1, 1, vec![10, 200]).unwrap();
        let b = Frame::new(2, 1, 1, vec![30, 50]).unwrap();
        let out = saturating_diff(&a, &b);
        assert_eq!(out.data, vec![0, 150]);
    }

    #[test]
    fn gray_uses_luma_weights() {
        let src = Frame::new(1, 1, 3, vec![255, 0, 0]).unwrap();
        assert_eq!(to_gray(&src).data, vec![76]); // round(0.299 * 255)

        let src = Frame::new(1, 1, 3, vec![0, 255, 0]).unwrap();
        assert_eq!(to_gray(&src).data, vec![150]); // round(0.587 * 255)

        let src = Frame::new(1, 1, 3, vec![0, 0, 255]).unwrap();
        assert_eq!(to_gray(&src).data, vec![29]); // round(0.114 * 255)
    }

    #[test]
    fn gray_passes_single_channel_through() {
        let src = Frame::new(2, 1, 1, vec![3, 250]).unwrap();
        assert_eq!(to_gray(&src), src);
    }
}
