//! V4L2 frame source.
//!
//! `V4l2Source` captures from a local device node through memory-mapped
//! streaming. `grab()` dequeues the next buffer and copies it out (the mmap
//! buffer is handed back to the driver on the next dequeue); `retrieve()` decodes
//! that copy into the caller's color frame.
//!
//! The device's current resolution is kept as-is. We only ask for RGB3; if the
//! driver refuses, whatever supported format it reports is decoded instead.
//!
//! A dequeue that would block or was interrupted is "no frame yet". Any other
//! stream error (the device was unplugged, the driver gave up) latches a fault
//! that the next `retrieve()` reports.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::io;
use std::path::PathBuf;

use super::normalize::{decode_to_color, PixelFormat};
use super::FrameSource;
use crate::frame::{Dimensions, Frame};

const STREAM_BUFFERS: u32 = 4;

/// V4L2 capture device.
pub struct V4l2Source {
    path: PathBuf,
    state: Option<V4l2State>,
    dims: Dimensions,
    format: Option<PixelFormat>,
    pending: Vec<u8>,
    latched: bool,
    /// Permanent stream error waiting to be reported by `retrieve`.
    fault: Option<String>,
    frames_captured: u64,
    last_error: Option<String>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    /// Open the device node. Failures leave the source unopened.
    pub fn open(path: PathBuf) -> Self {
        let mut source = Self {
            path,
            state: None,
            dims: Dimensions::default(),
            format: None,
            pending: Vec::new(),
            latched: false,
            fault: None,
            frames_captured: 0,
            last_error: None,
        };
        if let Err(err) = source.connect() {
            log::error!("V4l2Source: {:#}", err);
            source.last_error = Some(format!("{:#}", err));
        }
        source
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.path)
            .with_context(|| format!("open v4l2 device {}", self.path.display()))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set RGB3 on {}: {}",
                    self.path.display(),
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let pixel_format = pixel_format_for(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported v4l2 pixel format {}",
                String::from_utf8_lossy(&format.fourcc.repr)
            )
        })?;

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        self.dims = Dimensions::new(format.width, format.height);
        self.format = Some(pixel_format);
        self.state = Some(state);
        self.last_error = None;

        log::info!(
            "V4l2Source: opened {} ({} {})",
            self.path.display(),
            self.dims,
            pixel_format
        );
        Ok(())
    }
}

/// Whether a dequeue error only means the next buffer is not ready.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Option<PixelFormat> {
    match fourcc {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"BGR3" => Some(PixelFormat::Bgr24),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"NV12" => Some(PixelFormat::Nv12),
        _ => None,
    }
}

impl FrameSource for V4l2Source {
    fn is_opened(&self) -> bool {
        self.state.is_some()
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn describe(&self) -> String {
        match self.format {
            Some(format) => format!("Format {}, Mode mmap", format),
            None => "Format unknown, Mode none".to_string(),
        }
    }

    fn grab(&mut self) -> bool {
        use v4l::io::traits::CaptureStream;

        if self.fault.is_some() {
            return true;
        }
        let Self {
            path,
            state,
            pending,
            latched,
            fault,
            last_error,
            ..
        } = self;
        let Some(state) = state.as_mut() else {
            return false;
        };
        let dequeued = state.with_stream_mut(|stream| {
            stream.next().map(|(buf, _meta)| {
                pending.clear();
                pending.extend_from_slice(buf);
            })
        });
        match dequeued {
            Ok(()) => {
                *latched = true;
                true
            }
            Err(err) if is_transient(&err) => {
                log::debug!("V4l2Source: no frame from {}: {}", path.display(), err);
                false
            }
            Err(err) => {
                let message = format!("stream error on {}: {}", path.display(), err);
                log::error!("V4l2Source: {}", message);
                *last_error = Some(message.clone());
                *fault = Some(message);
                true
            }
        }
    }

    fn retrieve(&mut self, channel: u32, frame: &mut Frame) -> Result<()> {
        if channel != 0 {
            return Err(anyhow!("v4l2 device has no channel {}", channel));
        }
        let format = self.format.context("v4l2 device not open")?;
        if let Some(fault) = self.fault.take() {
            self.latched = false;
            self.state = None;
            return Err(anyhow!("{}", fault));
        }
        if !std::mem::take(&mut self.latched) {
            return Err(anyhow!("retrieve called without a grabbed frame"));
        }
        decode_to_color(&self.pending, self.dims, format, frame).map_err(|err| {
            self.last_error = Some(err.to_string());
            err.context(format!("decode frame from {}", self.path.display()))
        })?;
        self.frames_captured += 1;
        Ok(())
    }
}
