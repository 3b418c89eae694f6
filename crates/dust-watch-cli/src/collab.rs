//! File-backed collaborator implementations.
//!
//! Deployments with a real camera and GPIO alarm hardware supply their own
//! `FrameSource`/`AlarmActuator`; these stand-ins let the monitor run against
//! an image path kept fresh by an external capture process, with a flag file
//! as the operator's reset button.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageReader, RgbImage};

use dust_watch_core::{DetectError, Frame};
use dust_watch_monitor::{
    ActuatorError, AlarmActuator, CaptureError, FrameSource, FrameWriter, MonitorConfig,
    WriteError,
};

/// Errors from the CLI's file-backed inputs: config and one-shot image
/// loading.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read config {path:?}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to open image {path:?}")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path:?}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Frame(#[from] DetectError),
}

/// Read and parse a JSON monitor config file.
pub fn load_config(path: &Path) -> Result<MonitorConfig, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert a decoded image into a 3-channel frame.
pub fn frame_from_image(img: &DynamicImage) -> Result<Frame, DetectError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(width as usize, height as usize, 3, rgb.into_raw())
}

/// Convert a frame back into an encodable image.
pub fn image_from_frame(frame: &Frame) -> Result<DynamicImage, String> {
    let width = frame.width as u32;
    let height = frame.height as u32;
    match frame.channels {
        1 => GrayImage::from_raw(width, height, frame.data.clone())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| "gray buffer does not match dimensions".to_string()),
        3 => RgbImage::from_raw(width, height, frame.data.clone())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "rgb buffer does not match dimensions".to_string()),
        n => Err(format!("cannot encode {n}-channel frame")),
    }
}

/// Load an image file as a frame, optionally prescaled.
pub fn load_frame(path: &Path, scale: Option<f32>) -> Result<Frame, LoadError> {
    let img = ImageReader::open(path)
        .map_err(|source| LoadError::ImageOpen {
            path: path.to_path_buf(),
            source,
        })?
        .decode()
        .map_err(|source| LoadError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })?;
    let img = match scale {
        Some(s) if s > 0.0 && s != 1.0 => {
            let width = ((img.width() as f32 * s).round() as u32).max(1);
            let height = ((img.height() as f32 * s).round() as u32).max(1);
            img.resize_exact(width, height, FilterType::Triangle)
        }
        _ => img,
    };
    Ok(frame_from_image(&img)?)
}

/// Re-reads one image path on every capture. An external camera process is
/// expected to keep the file fresh between scans.
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FrameSource for FileFrameSource {
    fn capture(&mut self, resolution: (u32, u32)) -> Result<Frame, CaptureError> {
        let img = ImageReader::open(&self.path)
            .map_err(|e| CaptureError {
                reason: format!("failed to open {}: {e}", self.path.display()),
            })?
            .decode()
            .map_err(|e| CaptureError {
                reason: format!("failed to decode {}: {e}", self.path.display()),
            })?;
        let img = img.resize_exact(resolution.0, resolution.1, FilterType::Triangle);
        frame_from_image(&img).map_err(|e| CaptureError {
            reason: e.to_string(),
        })
    }
}

/// Logs output transitions; the reset input is a flag file the operator
/// touches to silence the alarm. Observing the flag consumes it.
pub struct FlagFileActuator {
    reset_flag: Option<PathBuf>,
}

impl FlagFileActuator {
    pub fn new(reset_flag: Option<PathBuf>) -> Self {
        Self { reset_flag }
    }
}

impl AlarmActuator for FlagFileActuator {
    fn set_indicator(&mut self, on: bool) -> Result<(), ActuatorError> {
        log::info!("indicator light {}", if on { "ON" } else { "off" });
        Ok(())
    }

    fn set_audible(&mut self, on: bool) -> Result<(), ActuatorError> {
        log::info!("audible alarm {}", if on { "ON" } else { "off" });
        Ok(())
    }

    fn reset_requested(&mut self) -> bool {
        let Some(flag) = &self.reset_flag else {
            return false;
        };
        if flag.exists() {
            if let Err(e) = fs::remove_file(flag) {
                log::warn!("failed to consume reset flag {}: {e}", flag.display());
            }
            return true;
        }
        false
    }
}

/// Encodes stage frames as PNG via the `image` crate.
#[derive(Default)]
pub struct PngFrameWriter;

impl FrameWriter for PngFrameWriter {
    fn write(&mut self, frame: &Frame, path: &Path) -> Result<(), WriteError> {
        let img = image_from_frame(frame).map_err(|reason| WriteError {
            path: path.to_path_buf(),
            reason,
        })?;
        img.save(path).map_err(|e| WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
