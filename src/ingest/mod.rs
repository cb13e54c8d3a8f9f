//! Frame ingestion sources.
//!
//! This module provides the sources the harness can capture from:
//! - Synthetic frames (`stub://WIDTHxHEIGHT`), always available
//! - USB/V4L2 devices by index or path (feature: ingest-v4l2)
//! - A single still image served repeatedly (feature: ingest-image)
//!
//! Every source follows the same two-phase protocol:
//! - `grab()` latches the next frame and returns `false` when none is ready yet.
//!   That is a normal wait condition, not an error.
//! - `retrieve()` decodes the latched frame into a caller-owned `Frame`.
//!   A failure here means the device is no longer usable.
//!
//! Opening never fails loudly. A source that could not be opened reports
//! `is_opened() == false` and keeps the cause in `last_error()`.

pub mod normalize;
#[cfg(feature = "ingest-image")]
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::frame::{Dimensions, Frame};

pub use normalize::{ChannelOrder, GrayscaleNormalizer, PixelFormat};
#[cfg(feature = "ingest-image")]
pub use still::StillImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A camera device driven with grab-then-retrieve capture.
pub trait FrameSource {
    /// Whether the device was opened and is still usable.
    fn is_opened(&self) -> bool;

    /// Why the device is not usable, when known.
    fn last_error(&self) -> Option<&str>;

    /// Frame size as reported by the device. Zero when never reported.
    fn dimensions(&self) -> Dimensions;

    /// Human-readable format and mode, for the startup banner.
    fn describe(&self) -> String;

    /// Latch the next frame. `false` means no frame is available yet.
    fn grab(&mut self) -> bool;

    /// Decode the most recently grabbed frame for `channel` into `frame`.
    fn retrieve(&mut self, channel: u32, frame: &mut Frame) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn last_error(&self) -> Option<&str> {
        (**self).last_error()
    }

    fn dimensions(&self) -> Dimensions {
        (**self).dimensions()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn grab(&mut self) -> bool {
        (**self).grab()
    }

    fn retrieve(&mut self, channel: u32, frame: &mut Frame) -> Result<()> {
        (**self).retrieve(channel, frame)
    }
}

// ----------------------------------------------------------------------------
// Device selection
// ----------------------------------------------------------------------------

/// Which capture device to open.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceSpec {
    /// Capture device by index (`0` is `/dev/video0`).
    Index(u32),
    /// Capture device node path.
    Path(PathBuf),
    /// Generated frames.
    Synthetic(SyntheticConfig),
    /// A still image file served as every frame.
    Image(PathBuf),
}

impl Default for DeviceSpec {
    fn default() -> Self {
        DeviceSpec::Index(0)
    }
}

impl FromStr for DeviceSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("device must not be empty"));
        }
        if let Some(rest) = s.strip_prefix("stub://") {
            return Ok(DeviceSpec::Synthetic(rest.parse()?));
        }
        if let Some(path) = s.strip_prefix("image:") {
            if path.is_empty() {
                return Err(anyhow!("image device needs a path (image:PATH)"));
            }
            return Ok(DeviceSpec::Image(PathBuf::from(path)));
        }
        if s.contains("://") {
            return Err(anyhow!(
                "unsupported device '{}' (expected an index, a device path, stub:// or image:)",
                s
            ));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let index = s
                .parse()
                .map_err(|_| anyhow!("device index out of range: {}", s))?;
            return Ok(DeviceSpec::Index(index));
        }
        Ok(DeviceSpec::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Index(index) => write!(f, "{}", index),
            DeviceSpec::Path(path) => write!(f, "{}", path.display()),
            DeviceSpec::Synthetic(config) => write!(f, "stub://{}", config),
            DeviceSpec::Image(path) => write!(f, "image:{}", path.display()),
        }
    }
}

/// Open the device named by `spec`.
///
/// Always returns a source; check `is_opened()` before capturing.
pub fn open_device(spec: &DeviceSpec) -> Box<dyn FrameSource> {
    match spec {
        DeviceSpec::Synthetic(config) => Box::new(SyntheticSource::open(config.clone())),
        DeviceSpec::Index(index) => open_v4l2(PathBuf::from(format!("/dev/video{}", index))),
        DeviceSpec::Path(path) => open_v4l2(path.clone()),
        DeviceSpec::Image(path) => open_image(path.clone()),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(path: PathBuf) -> Box<dyn FrameSource> {
    Box::new(V4l2Source::open(path))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(path: PathBuf) -> Box<dyn FrameSource> {
    Box::new(UnavailableSource::new(format!(
        "capture device {} requires the ingest-v4l2 feature",
        path.display()
    )))
}

#[cfg(feature = "ingest-image")]
fn open_image(path: PathBuf) -> Box<dyn FrameSource> {
    Box::new(StillImageSource::open(path))
}

#[cfg(not(feature = "ingest-image"))]
fn open_image(path: PathBuf) -> Box<dyn FrameSource> {
    Box::new(UnavailableSource::new(format!(
        "image source {} requires the ingest-image feature",
        path.display()
    )))
}

/// Placeholder for a device this build cannot drive. Never opened.
#[cfg_attr(all(feature = "ingest-v4l2", feature = "ingest-image"), allow(dead_code))]
struct UnavailableSource {
    reason: String,
}

#[cfg_attr(all(feature = "ingest-v4l2", feature = "ingest-image"), allow(dead_code))]
impl UnavailableSource {
    fn new(reason: String) -> Self {
        log::error!("{}", reason);
        Self { reason }
    }
}

impl FrameSource for UnavailableSource {
    fn is_opened(&self) -> bool {
        false
    }

    fn last_error(&self) -> Option<&str> {
        Some(&self.reason)
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::default()
    }

    fn describe(&self) -> String {
        "unavailable".to_string()
    }

    fn grab(&mut self) -> bool {
        false
    }

    fn retrieve(&mut self, _channel: u32, _frame: &mut Frame) -> Result<()> {
        Err(anyhow!("{}", self.reason))
    }
}
