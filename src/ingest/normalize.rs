//! Pixel format normalization.
//!
//! Two jobs live here:
//! - decoding whatever a device delivers (`PixelFormat`) into a packed color `Frame`
//! - converting a color `Frame` into single-channel grayscale for the tracker
//!
//! Grayscale uses BT.601 luma weights in 14-bit fixed point with rounding, so a
//! pixel with R == G == B maps to exactly that value. The weights are not
//! symmetric in R and B, which is why the channel order is explicit
//! configuration (`ChannelOrder`) and checked against the frame's layout.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::frame::{Dimensions, Frame, PixelLayout};

const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_ROUND: u32 = 1 << (LUMA_SHIFT - 1);

/// Wire formats a capture device may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
    /// Planar Y followed by interleaved UV at quarter resolution.
    Nv12,
}

impl PixelFormat {
    /// Layout of the color frame produced by `decode_to_color`.
    pub fn decoded_layout(self) -> PixelLayout {
        match self {
            PixelFormat::Bgr24 => PixelLayout::Bgr8,
            PixelFormat::Rgb24 | PixelFormat::Yuyv | PixelFormat::Nv12 => PixelLayout::Rgb8,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb24 => "RGB3",
            PixelFormat::Bgr24 => "BGR3",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Nv12 => "NV12",
        };
        f.write_str(name)
    }
}

/// Channel order the grayscale conversion assumes for 3-channel input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// The color layout this order corresponds to.
    pub fn layout(self) -> PixelLayout {
        match self {
            ChannelOrder::Rgb => PixelLayout::Rgb8,
            ChannelOrder::Bgr => PixelLayout::Bgr8,
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(anyhow!("unknown channel order '{}' (expected rgb or bgr)", other)),
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgb => f.write_str("rgb"),
            ChannelOrder::Bgr => f.write_str("bgr"),
        }
    }
}

// ----------------------------------------------------------------------------
// Grayscale
// ----------------------------------------------------------------------------

/// Color-to-grayscale converter bound to a configured channel order.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrayscaleNormalizer {
    order: ChannelOrder,
}

impl GrayscaleNormalizer {
    pub fn new(order: ChannelOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Convert `color` into `gray`, reusing `gray`'s buffer.
    ///
    /// Fails when the frame's layout disagrees with the configured order.
    pub fn normalize(&self, color: &Frame, gray: &mut Frame) -> Result<()> {
        if color.layout() != self.order.layout() {
            return Err(anyhow!(
                "color frame layout {:?} does not match configured channel order {}",
                color.layout(),
                self.order
            ));
        }
        to_grayscale(color, self.order, gray)
    }
}

/// Convert a 3-channel frame into single-channel grayscale, interpreting its
/// channels in `order` regardless of the frame's own layout tag.
pub fn to_grayscale(color: &Frame, order: ChannelOrder, gray: &mut Frame) -> Result<()> {
    if !color.layout().is_color() {
        return Err(anyhow!(
            "grayscale conversion expects a 3-channel frame, got {:?}",
            color.layout()
        ));
    }
    let (r_idx, b_idx) = match order {
        ChannelOrder::Rgb => (0, 2),
        ChannelOrder::Bgr => (2, 0),
    };

    let src = color.pixels();
    let dst = gray.reshape(color.dimensions(), PixelLayout::Gray8)?;
    for (out, px) in dst.iter_mut().zip(src.chunks_exact(3)) {
        let r = px[r_idx] as u32;
        let g = px[1] as u32;
        let b = px[b_idx] as u32;
        *out = ((r * LUMA_R + g * LUMA_G + b * LUMA_B + LUMA_ROUND) >> LUMA_SHIFT) as u8;
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Device decoding
// ----------------------------------------------------------------------------

/// Decode a raw device buffer into a packed color frame.
pub fn decode_to_color(
    pixels: &[u8],
    dims: Dimensions,
    format: PixelFormat,
    out: &mut Frame,
) -> Result<()> {
    let expected = encoded_len(dims, format)?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    let pixels = &pixels[..expected];
    let dst = out.reshape(dims, format.decoded_layout())?;

    match format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => dst.copy_from_slice(pixels),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, dims, dst),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, dims, dst),
    }
    Ok(())
}

/// Bytes a device buffer of `format` must hold for `dims`.
pub fn encoded_len(dims: Dimensions, format: PixelFormat) -> Result<usize> {
    let pixels = dims.pixel_count()?;
    let len = match format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels.checked_mul(3),
        PixelFormat::Yuyv => {
            if dims.width % 2 != 0 {
                return Err(anyhow!("YUYV frames need an even width, got {}", dims));
            }
            pixels.checked_mul(2)
        }
        PixelFormat::Nv12 => {
            if dims.width % 2 != 0 || dims.height % 2 != 0 {
                return Err(anyhow!("NV12 frames need even dimensions, got {}", dims));
            }
            pixels.checked_add(pixels / 2)
        }
    };
    len.ok_or_else(|| anyhow!("{} frame dimensions overflow: {}", format, dims))
}

fn yuyv_to_rgb(pixels: &[u8], dims: Dimensions, rgb: &mut [u8]) {
    let pairs = pixels.chunks_exact(4);
    let out = rgb.chunks_exact_mut(6);
    for (quad, dst) in pairs.zip(out) {
        let (u, v) = (quad[1], quad[3]);
        write_rgb(&mut dst[..3], quad[0], u, v);
        write_rgb(&mut dst[3..], quad[2], u, v);
    }
    debug_assert_eq!(rgb.len(), dims.width as usize * dims.height as usize * 3);
}

fn nv12_to_rgb(pixels: &[u8], dims: Dimensions, rgb: &mut [u8]) {
    let w = dims.width as usize;
    let h = dims.height as usize;
    let y_plane = w * h;

    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i];
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let offset = (j * w + i) * 3;
            write_rgb(
                &mut rgb[offset..offset + 3],
                y,
                pixels[uv_index],
                pixels[uv_index + 1],
            );
        }
    }
}

fn write_rgb(dst: &mut [u8], y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    dst[0] = clamp_to_u8(y + 1.402_f32 * v);
    dst[1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    dst[2] = clamp_to_u8(y + 1.772_f32 * u);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
