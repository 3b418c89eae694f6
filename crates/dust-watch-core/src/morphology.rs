//! Morphological operators on binary frames, square structuring element.

use crate::frame::Frame;

/// Neighborhood maximum over a k×k window; grows foreground regions.
pub fn dilate(src: &Frame, ksize: usize) -> Frame {
    windowed(src, ksize, u8::max, 0)
}

/// Neighborhood minimum over a k×k window; shrinks foreground regions.
pub fn erode(src: &Frame, ksize: usize) -> Frame {
    windowed(src, ksize, u8::min, 255)
}

/// Morphological closing: `iterations` dilations followed by `iterations`
/// erosions. Merges nearby foreground blobs and fills small gaps without
/// (for well-separated content) changing overall region extent.
pub fn close(src: &Frame, ksize: usize, iterations: usize) -> Frame {
    debug_assert!(iterations > 0);
    let mut out = dilate(src, ksize);
    for _ in 1..iterations {
        out = dilate(&out, ksize);
    }
    for _ in 0..iterations {
        out = erode(&out, ksize);
    }
    out
}

// Out-of-bounds neighbors are ignored: the window is clipped to the frame
// rather than padded, so borders never bias toward either extreme.
fn windowed(src: &Frame, ksize: usize, fold: impl Fn(u8, u8) -> u8, init: u8) -> Frame {
    debug_assert!(ksize % 2 == 1 && ksize > 0);
    let radius = ksize / 2;
    let mut out = Frame::filled(src.width, src.height, src.channels, 0);

    for y in 0..src.height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius).min(src.height - 1);
        for x in 0..src.width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(src.width - 1);
            for c in 0..src.channels {
                let mut acc = init;
                for ny in y0..=y1 {
                    for nx in x0..=x1 {
                        acc = fold(acc, src.get(nx, ny, c));
                    }
                }
                out.put(x, y, c, acc);
            }
        }
    }
    out
}
