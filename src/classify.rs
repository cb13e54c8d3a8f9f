//! Device classification by reported resolution.
//!
//! Some cameras describe their stream with the wrong pixel format. The Oculus
//! DK2 positional tracker is the one we know of: it streams 8-bit mono at
//! 376x480 but advertises a color format, so every byte pair gets decoded as
//! chroma. This harness has no path that can interpret that stream, so such
//! devices are rejected at startup.

use anyhow::{anyhow, Result};
use std::fmt;

use crate::frame::Dimensions;

/// Resolution reported by the Oculus DK2 tracking camera.
pub const OCULUS_DK2_SIGNATURE: Dimensions = Dimensions::new(376, 480);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    /// Format reporting can be trusted.
    Standard,
    /// Mono sensor advertising a color format.
    OculusDk2,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Standard => f.write_str("standard camera"),
            DeviceClass::OculusDk2 => f.write_str("Oculus DK2 camera"),
        }
    }
}

/// Classify a device from its reported dimensions.
///
/// Only an exact match on both width and height counts. Zero dimensions are
/// `Standard` here; the session rejects them separately.
pub fn classify(dims: Dimensions) -> DeviceClass {
    if dims == OCULUS_DK2_SIGNATURE {
        DeviceClass::OculusDk2
    } else {
        DeviceClass::Standard
    }
}

/// Reject devices this harness cannot decode correctly.
pub fn ensure_supported(dims: Dimensions) -> Result<DeviceClass> {
    match classify(dims) {
        DeviceClass::Standard => Ok(DeviceClass::Standard),
        class => Err(anyhow!(
            "{} ({} mono stream reported as color) is not supported by this standalone harness",
            class,
            dims
        )),
    }
}
