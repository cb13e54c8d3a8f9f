//! Synthetic frame source (`stub://`).
//!
//! Generates a dark scene with a ring of bright square markers that rotates a
//! little every frame. Frames are rendered in a device pixel format and decoded
//! through the same path as real captures, so the normalizer sees realistic
//! input.
//!
//! Options after `?` shape the device's behavior for demos and tests:
//! - `format=rgb|bgr|yuyv|nv12` wire format (default rgb)
//! - `markers=N` number of markers in the ring (default 4)
//! - `miss_every=N` every N-th grab reports "no frame yet"
//! - `fail_after=N` retrieve fails once N frames were delivered
//! - `closed` the device never opens

use anyhow::{anyhow, Result};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use super::normalize::{decode_to_color, encoded_len, PixelFormat};
use super::FrameSource;
use crate::frame::{Dimensions, Frame};

const BACKGROUND_LUMA: u8 = 16;
const MARKER_LUMA: u8 = 255;
const DEFAULT_MARKERS: u32 = 4;

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub dims: Dimensions,
    pub format: PixelFormat,
    pub markers: u32,
    pub miss_every: Option<u32>,
    pub fail_after: Option<u64>,
    pub closed: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            dims: Dimensions::new(640, 480),
            format: PixelFormat::Rgb24,
            markers: DEFAULT_MARKERS,
            miss_every: None,
            fail_after: None,
            closed: false,
        }
    }
}

impl FromStr for SyntheticConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (size, query) = match s.split_once('?') {
            Some((size, query)) => (size, Some(query)),
            None => (s, None),
        };
        let mut config = SyntheticConfig {
            dims: parse_size(size)?,
            ..SyntheticConfig::default()
        };

        for option in query.into_iter().flat_map(|q| q.split('&')) {
            let option = option.trim();
            if option.is_empty() {
                continue;
            }
            let (key, value) = option.split_once('=').unwrap_or((option, ""));
            match key {
                "format" => config.format = parse_format(value)?,
                "markers" => config.markers = parse_number(key, value)?,
                "miss_every" => {
                    let every: u32 = parse_number(key, value)?;
                    if every == 0 {
                        return Err(anyhow!("miss_every must be greater than zero"));
                    }
                    config.miss_every = Some(every);
                }
                "fail_after" => config.fail_after = Some(parse_number(key, value)?),
                "closed" => config.closed = true,
                other => return Err(anyhow!("unknown synthetic option '{}'", other)),
            }
        }
        Ok(config)
    }
}

impl fmt::Display for SyntheticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dims)?;
        let mut options = Vec::new();
        if self.format != PixelFormat::Rgb24 {
            options.push(format!("format={}", self.format.to_string().to_lowercase()));
        }
        if self.markers != DEFAULT_MARKERS {
            options.push(format!("markers={}", self.markers));
        }
        if let Some(every) = self.miss_every {
            options.push(format!("miss_every={}", every));
        }
        if let Some(after) = self.fail_after {
            options.push(format!("fail_after={}", after));
        }
        if self.closed {
            options.push("closed".to_string());
        }
        if !options.is_empty() {
            write!(f, "?{}", options.join("&"))?;
        }
        Ok(())
    }
}

fn parse_size(size: &str) -> Result<Dimensions> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("synthetic size must look like WIDTHxHEIGHT, got '{}'", size))?;
    Ok(Dimensions::new(
        parse_number("width", w)?,
        parse_number("height", h)?,
    ))
}

fn parse_format(value: &str) -> Result<PixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "rgb" | "rgb3" => Ok(PixelFormat::Rgb24),
        "bgr" | "bgr3" => Ok(PixelFormat::Bgr24),
        "yuyv" => Ok(PixelFormat::Yuyv),
        "nv12" => Ok(PixelFormat::Nv12),
        other => Err(anyhow!("unknown synthetic format '{}'", other)),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("synthetic option {} must be a number, got '{}'", key, value))
}

// ----------------------------------------------------------------------------
// Source
// ----------------------------------------------------------------------------

/// Synthetic capture device.
pub struct SyntheticSource {
    config: SyntheticConfig,
    opened: bool,
    last_error: Option<String>,
    grab_count: u64,
    frames_delivered: u64,
    /// Encoded buffer for the latched frame, in `config.format`.
    pending: Vec<u8>,
    latched: bool,
}

impl SyntheticSource {
    pub fn open(config: SyntheticConfig) -> Self {
        let mut source = Self {
            config,
            opened: false,
            last_error: None,
            grab_count: 0,
            frames_delivered: 0,
            pending: Vec::new(),
            latched: false,
        };

        if source.config.closed {
            source.last_error = Some("synthetic device configured as closed".to_string());
        } else if let Err(err) = encoded_len(source.config.dims, source.config.format) {
            source.last_error = Some(err.to_string());
        } else {
            source.opened = true;
            log::info!("SyntheticSource: opened stub://{}", source.config);
        }
        source
    }

    /// Frames handed out through `retrieve` so far.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    fn render(&mut self) -> Result<()> {
        let dims = self.config.dims;
        let format = self.config.format;
        let len = encoded_len(dims, format)?;
        self.pending.clear();
        self.pending.resize(len, 0);

        fill_background(&mut self.pending, dims, format);

        let w = dims.width as i64;
        let h = dims.height as i64;
        let half = (w.min(h) / 80).max(1);
        let radius = (w.min(h) / 4) as f64;
        let phase = self.grab_count as f64 * 0.05;
        for marker in 0..self.config.markers {
            let angle = phase + TAU * marker as f64 / self.config.markers as f64;
            let cx = (w / 2) + (radius * angle.cos()).round() as i64;
            let cy = (h / 2) + (radius * angle.sin()).round() as i64;
            for y in (cy - half).max(0)..(cy + half + 1).min(h) {
                for x in (cx - half).max(0)..(cx + half + 1).min(w) {
                    set_luma(&mut self.pending, dims, format, x as usize, y as usize, MARKER_LUMA);
                }
            }
        }
        Ok(())
    }
}

fn fill_background(buf: &mut [u8], dims: Dimensions, format: PixelFormat) {
    match format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => buf.fill(BACKGROUND_LUMA),
        PixelFormat::Yuyv => {
            for pair in buf.chunks_exact_mut(2) {
                pair[0] = BACKGROUND_LUMA;
                pair[1] = 128;
            }
        }
        PixelFormat::Nv12 => {
            let y_plane = dims.width as usize * dims.height as usize;
            buf[..y_plane].fill(BACKGROUND_LUMA);
            buf[y_plane..].fill(128);
        }
    }
}

fn set_luma(buf: &mut [u8], dims: Dimensions, format: PixelFormat, x: usize, y: usize, value: u8) {
    let index = y * dims.width as usize + x;
    match format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => buf[index * 3..index * 3 + 3].fill(value),
        PixelFormat::Yuyv => buf[index * 2] = value,
        PixelFormat::Nv12 => buf[index] = value,
    }
}

impl FrameSource for SyntheticSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn dimensions(&self) -> Dimensions {
        if self.config.closed {
            Dimensions::default()
        } else {
            self.config.dims
        }
    }

    fn describe(&self) -> String {
        format!("Format {}, Mode synthetic", self.config.format)
    }

    fn grab(&mut self) -> bool {
        if !self.opened {
            return false;
        }
        self.grab_count += 1;
        if let Some(every) = self.config.miss_every {
            if self.grab_count % every as u64 == 0 {
                log::trace!("SyntheticSource: no frame on grab {}", self.grab_count);
                return false;
            }
        }
        match self.render() {
            Ok(()) => {
                self.latched = true;
                true
            }
            Err(err) => {
                log::debug!("SyntheticSource: render failed: {}", err);
                false
            }
        }
    }

    fn retrieve(&mut self, channel: u32, frame: &mut Frame) -> Result<()> {
        if !self.opened {
            return Err(anyhow!("synthetic device is not open"));
        }
        if channel != 0 {
            return Err(anyhow!("synthetic device has no channel {}", channel));
        }
        if !std::mem::take(&mut self.latched) {
            return Err(anyhow!("retrieve called without a grabbed frame"));
        }
        if let Some(limit) = self.config.fail_after {
            if self.frames_delivered >= limit {
                self.opened = false;
                let msg = format!("synthetic device failed after {} frames", limit);
                self.last_error = Some(msg.clone());
                return Err(anyhow!(msg));
            }
        }
        decode_to_color(&self.pending, self.config.dims, self.config.format, frame)?;
        self.frames_delivered += 1;
        Ok(())
    }
}
