//! Still image frame source (`image:PATH`).
//!
//! Decodes one PNG/JPEG file at open time and serves it as every frame. Handy
//! for replaying a captured LED frame through the tracker without a camera.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::{Dimensions, Frame, PixelLayout};

pub struct StillImageSource {
    path: PathBuf,
    image: Option<Frame>,
    last_error: Option<String>,
    latched: bool,
}

impl StillImageSource {
    pub fn open(path: PathBuf) -> Self {
        match load(&path) {
            Ok(frame) => {
                log::info!(
                    "StillImageSource: loaded {} ({})",
                    path.display(),
                    frame.dimensions()
                );
                Self {
                    path,
                    image: Some(frame),
                    last_error: None,
                    latched: false,
                }
            }
            Err(err) => {
                log::error!("StillImageSource: {:#}", err);
                Self {
                    path,
                    image: None,
                    last_error: Some(format!("{:#}", err)),
                    latched: false,
                }
            }
        }
    }
}

fn load(path: &Path) -> Result<Frame> {
    let rgb = image::open(path)
        .with_context(|| format!("open image {}", path.display()))?
        .to_rgb8();
    let dims = Dimensions::new(rgb.width(), rgb.height());
    Frame::from_pixels(dims, PixelLayout::Rgb8, rgb.into_raw())
}

impl FrameSource for StillImageSource {
    fn is_opened(&self) -> bool {
        self.image.is_some()
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn dimensions(&self) -> Dimensions {
        self.image
            .as_ref()
            .map(Frame::dimensions)
            .unwrap_or_default()
    }

    fn describe(&self) -> String {
        "Format RGB3, Mode still".to_string()
    }

    fn grab(&mut self) -> bool {
        self.latched = self.image.is_some();
        self.latched
    }

    fn retrieve(&mut self, channel: u32, frame: &mut Frame) -> Result<()> {
        if channel != 0 {
            return Err(anyhow!("image source has no channel {}", channel));
        }
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("image {} is not loaded", self.path.display()))?;
        if !std::mem::take(&mut self.latched) {
            return Err(anyhow!("retrieve called without a grabbed frame"));
        }
        frame
            .reshape(image.dimensions(), image.layout())?
            .copy_from_slice(image.pixels());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_the_same_image_every_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("led.png");
        let mut img = image::RgbImage::new(4, 2);
        img.put_pixel(1, 1, image::Rgb([250, 10, 5]));
        img.save(&path)?;

        let mut source = StillImageSource::open(path);
        assert!(source.is_opened());
        assert_eq!(source.dimensions(), Dimensions::new(4, 2));

        let mut frame = Frame::new();
        for _ in 0..2 {
            assert!(source.grab());
            source.retrieve(0, &mut frame)?;
            assert_eq!(frame.pixel(1, 1), Some(&[250u8, 10, 5][..]));
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_unopened() {
        let source = StillImageSource::open(PathBuf::from("/nonexistent/led.png"));
        assert!(!source.is_opened());
        assert!(source.dimensions().is_empty());
        assert!(source.last_error().unwrap().contains("open image"));
    }
}
