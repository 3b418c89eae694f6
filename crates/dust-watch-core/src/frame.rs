use crate::pipeline::DetectError;

/// Owned 2D pixel buffer: row-major, interleaved channels, values in [0, 255].
///
/// `channels` is 3 for color frames and 1 for grayscale/binary frames.
/// Frames are value-like; every pipeline stage produces a fresh one and never
/// mutates a frame it did not produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Frame {
    /// Build a frame from an existing buffer, validating shape up front.
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, DetectError> {
        if width == 0 || height == 0 {
            return Err(DetectError::InvalidInput {
                reason: format!("empty frame (width={width}, height={height})"),
            });
        }
        if channels != 1 && channels != 3 {
            return Err(DetectError::InvalidInput {
                reason: format!("unsupported channel count {channels} (expected 1 or 3)"),
            });
        }
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(DetectError::InvalidInput {
                reason: format!(
                    "frame buffer length mismatch (expected {expected} bytes, got {})",
                    data.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A uniform frame with every sample set to `value`.
    pub fn filled(width: usize, height: usize, channels: usize, value: u8) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![value; width * height * channels],
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn is_color(&self) -> bool {
        self.channels == 3
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> u8 {
        self.data[(y * self.width + x) * self.channels + c]
    }

    #[inline]
    pub fn put(&mut self, x: usize, y: usize, c: usize, value: u8) {
        self.data[(y * self.width + x) * self.channels + c] = value;
    }

    /// Border-replicate sampling: out-of-bounds coordinates clamp to the edge.
    #[inline]
    pub(crate) fn sample_clamped(&self, x: i64, y: i64, c: usize) -> u8 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.get(x, y, c)
    }
}
