use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::DEFAULT_FOCAL_LENGTH_PX;
use crate::ingest::{ChannelOrder, DeviceSpec};
use crate::sink::OutputFormat;

const DEFAULT_DEVICE: &str = "0";
const DEFAULT_CHANNEL: u32 = 0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HarnessConfigFile {
    device: Option<String>,
    channel: Option<u32>,
    camera: Option<CameraConfigFile>,
    geometry_path: Option<PathBuf>,
    max_frames: Option<u64>,
    output: Option<OutputFormat>,
    legacy_exit_status: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    focal_length_px: Option<f64>,
    channel_order: Option<ChannelOrder>,
}

/// Startup configuration for the harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub device: DeviceSpec,
    pub channel: u32,
    pub focal_length_px: f64,
    pub channel_order: ChannelOrder,
    pub geometry_path: Option<PathBuf>,
    pub max_frames: Option<u64>,
    pub output: OutputFormat,
    /// Exit with status 0 however the session ended.
    pub legacy_exit_status: bool,
}

/// Values given on the command line. `None` leaves the configured value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device: Option<String>,
    pub channel: Option<u32>,
    pub focal_length_px: Option<f64>,
    pub channel_order: Option<ChannelOrder>,
    pub geometry_path: Option<PathBuf>,
    pub max_frames: Option<u64>,
    pub output: Option<OutputFormat>,
    pub legacy_exit_status: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            device: DeviceSpec::default(),
            channel: DEFAULT_CHANNEL,
            focal_length_px: DEFAULT_FOCAL_LENGTH_PX,
            channel_order: ChannelOrder::default(),
            geometry_path: None,
            max_frames: None,
            output: OutputFormat::default(),
            legacy_exit_status: false,
        }
    }
}

impl HarnessConfig {
    /// Load from `VBTRACKER_CONFIG` (if set) plus environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VBTRACKER_CONFIG").ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref(), Overrides::default())
    }

    /// Defaults, then the config file, then the environment, then `overrides`.
    pub fn load_with(config_path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HarnessConfigFile) -> Result<Self> {
        let device = file
            .device
            .as_deref()
            .unwrap_or(DEFAULT_DEVICE)
            .parse()
            .map_err(|e| anyhow!("invalid device in config file: {}", e))?;
        let camera = file.camera.unwrap_or_default();
        Ok(Self {
            device,
            channel: file.channel.unwrap_or(DEFAULT_CHANNEL),
            focal_length_px: camera.focal_length_px.unwrap_or(DEFAULT_FOCAL_LENGTH_PX),
            channel_order: camera.channel_order.unwrap_or_default(),
            geometry_path: file.geometry_path,
            max_frames: file.max_frames,
            output: file.output.unwrap_or_default(),
            legacy_exit_status: file.legacy_exit_status.unwrap_or(false),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("VBTRACKER_DEVICE") {
            if !device.trim().is_empty() {
                self.device = device
                    .parse()
                    .map_err(|e| anyhow!("VBTRACKER_DEVICE is invalid: {}", e))?;
            }
        }
        if let Ok(focal) = std::env::var("VBTRACKER_FOCAL_LENGTH") {
            self.focal_length_px = focal
                .trim()
                .parse()
                .map_err(|_| anyhow!("VBTRACKER_FOCAL_LENGTH must be a number of pixels"))?;
        }
        if let Ok(order) = std::env::var("VBTRACKER_CHANNEL_ORDER") {
            self.channel_order = order
                .parse()
                .map_err(|e| anyhow!("VBTRACKER_CHANNEL_ORDER is invalid: {}", e))?;
        }
        if let Ok(path) = std::env::var("VBTRACKER_GEOMETRY") {
            if !path.trim().is_empty() {
                self.geometry_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(frames) = std::env::var("VBTRACKER_MAX_FRAMES") {
            let frames: u64 = frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("VBTRACKER_MAX_FRAMES must be an integer frame count"))?;
            self.max_frames = Some(frames);
        }
        Ok(())
    }

    /// Apply command-line values on top of everything else.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(device) = overrides.device {
            self.device = device
                .parse()
                .map_err(|e| anyhow!("--device is invalid: {}", e))?;
        }
        if let Some(channel) = overrides.channel {
            self.channel = channel;
        }
        if let Some(focal) = overrides.focal_length_px {
            self.focal_length_px = focal;
        }
        if let Some(order) = overrides.channel_order {
            self.channel_order = order;
        }
        if let Some(path) = overrides.geometry_path {
            self.geometry_path = Some(path);
        }
        if let Some(frames) = overrides.max_frames {
            self.max_frames = Some(frames);
        }
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if overrides.legacy_exit_status {
            self.legacy_exit_status = true;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.focal_length_px.is_finite() || self.focal_length_px <= 0.0 {
            return Err(anyhow!(
                "focal length must be a positive number of pixels, got {}",
                self.focal_length_px
            ));
        }
        if self.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        if let Some(path) = &self.geometry_path {
            if !path.is_file() {
                return Err(anyhow!("geometry table {} does not exist", path.display()));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<HarnessConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_fill_defaults() -> Result<()> {
        let file: HarnessConfigFile = serde_json::from_str(
            r#"{ "device": "stub://320x240", "camera": { "channel_order": "bgr" } }"#,
        )?;
        let cfg = HarnessConfig::from_file(file)?;
        assert_eq!(cfg.device.to_string(), "stub://320x240");
        assert_eq!(cfg.channel_order, ChannelOrder::Bgr);
        assert_eq!(cfg.focal_length_px, DEFAULT_FOCAL_LENGTH_PX);
        assert_eq!(cfg.channel, 0);
        assert_eq!(cfg.output, OutputFormat::Text);
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<HarnessConfigFile>(r#"{ "fps": 30 }"#).is_err());
        assert!(serde_json::from_str::<HarnessConfigFile>(
            r#"{ "camera": { "channel_order": "rgba" } }"#
        )
        .is_err());
    }

    #[test]
    fn overrides_win() -> Result<()> {
        let mut cfg = HarnessConfig::default();
        cfg.apply_overrides(Overrides {
            device: Some("stub://64x48".to_string()),
            focal_length_px: Some(512.0),
            output: Some(OutputFormat::Json),
            legacy_exit_status: true,
            ..Overrides::default()
        })?;
        assert_eq!(cfg.device.to_string(), "stub://64x48");
        assert_eq!(cfg.focal_length_px, 512.0);
        assert_eq!(cfg.output, OutputFormat::Json);
        assert!(cfg.legacy_exit_status);
        assert_eq!(cfg.channel_order, ChannelOrder::Rgb);
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cfg = HarnessConfig {
            focal_length_px: -1.0,
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = HarnessConfig {
            max_frames: Some(0),
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = HarnessConfig {
            geometry_path: Some(PathBuf::from("/nonexistent/geometry.json")),
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_err());

        assert!(HarnessConfig::default().validate().is_ok());
    }
}
