//! Frame buffers.
//!
//! - `Frame`: a 2D pixel grid, either 3-channel color or 1-channel grayscale.
//! - `PixelLayout`: how the bytes of a `Frame` are laid out.
//! - `Dimensions`: width/height pair reported by devices and carried by frames.
//!
//! Frames are owned by the session loop and overwritten in place every capture
//! cycle. `Frame::reshape` keeps the existing allocation whenever it is large
//! enough, so steady-state capture does not allocate.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;

// ----------------------------------------------------------------------------
// Dimensions
// ----------------------------------------------------------------------------

/// Frame size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero. Devices that never reported a size end up here.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels, with overflow checking.
    pub fn pixel_count(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow: {}", self))
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ----------------------------------------------------------------------------
// PixelLayout
// ----------------------------------------------------------------------------

/// Byte layout of a frame. All layouts are 8 bits per channel, row-major, packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelLayout {
    /// Interleaved red, green, blue.
    Rgb8,
    /// Interleaved blue, green, red.
    Bgr8,
    /// Single luminance channel.
    #[default]
    Gray8,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Gray8 => 1,
        }
    }

    pub fn is_color(self) -> bool {
        self.channels() == 3
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image.
///
/// There is deliberately no frame history: the session keeps exactly one color
/// and one grayscale `Frame` and reuses them for every iteration.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    data: Vec<u8>,
    dims: Dimensions,
    layout: PixelLayout,
}

impl Frame {
    /// An empty 0x0 grayscale frame. Sources fill it through `reshape`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from existing pixel data, validating the length.
    pub fn from_pixels(dims: Dimensions, layout: PixelLayout, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(dims, layout)?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch for {}: expected {}, got {}",
                layout,
                dims,
                expected,
                data.len()
            ));
        }
        Ok(Self { data, dims, layout })
    }

    /// Resize this frame in place and hand back its pixel storage for filling.
    ///
    /// Previous contents are unspecified after this call.
    pub fn reshape(&mut self, dims: Dimensions, layout: PixelLayout) -> Result<&mut [u8]> {
        let len = expected_len(dims, layout)?;
        self.data.resize(len, 0);
        self.dims = dims;
        self.layout = layout;
        Ok(&mut self.data)
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Packed pixel bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Channel values of the pixel at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.dims.width || y >= self.dims.height {
            return None;
        }
        let channels = self.channels();
        let offset = (y as usize * self.dims.width as usize + x as usize) * channels;
        self.data.get(offset..offset + channels)
    }
}

fn expected_len(dims: Dimensions, layout: PixelLayout) -> Result<usize> {
    dims.pixel_count()?
        .checked_mul(layout.channels())
        .ok_or_else(|| anyhow!("frame dimensions overflow: {}", dims))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pixels_validates_length() {
        let dims = Dimensions::new(2, 2);
        assert!(Frame::from_pixels(dims, PixelLayout::Rgb8, vec![0; 12]).is_ok());
        assert!(Frame::from_pixels(dims, PixelLayout::Rgb8, vec![0; 4]).is_err());
        assert!(Frame::from_pixels(dims, PixelLayout::Gray8, vec![0; 4]).is_ok());
    }

    #[test]
    fn reshape_reuses_allocation() -> Result<()> {
        let mut frame = Frame::new();
        frame.reshape(Dimensions::new(64, 48), PixelLayout::Rgb8)?;
        let capacity = frame.data.capacity();
        let ptr = frame.data.as_ptr();

        frame.reshape(Dimensions::new(32, 24), PixelLayout::Gray8)?;
        assert_eq!(frame.pixels().len(), 32 * 24);
        assert_eq!(frame.data.capacity(), capacity);
        assert_eq!(frame.data.as_ptr(), ptr);
        Ok(())
    }

    #[test]
    fn pixel_lookup_respects_bounds() -> Result<()> {
        let data = (0u8..12).collect::<Vec<_>>();
        let frame = Frame::from_pixels(Dimensions::new(2, 2), PixelLayout::Rgb8, data)?;
        assert_eq!(frame.pixel(1, 1), Some(&[9u8, 10, 11][..]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
        Ok(())
    }

    #[test]
    fn empty_dimensions() {
        assert!(Dimensions::new(0, 480).is_empty());
        assert!(Dimensions::new(640, 0).is_empty());
        assert!(!Dimensions::new(640, 480).is_empty());
        assert_eq!(Dimensions::new(640, 480).to_string(), "640x480");
    }
}
