//! Pose result sinks.
//!
//! The tracking adapter reports through the `PoseSink` trait and knows nothing
//! about where poses end up. Two writers ship with the harness:
//! - `TextSink`: one human-readable line per pose (default)
//! - `JsonLinesSink`: one JSON object per pose
//!
//! `Vec<SensorPose>` is a sink too, which is what tests collect into.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::track::SensorPose;

/// Consumer of resolved poses.
pub trait PoseSink {
    /// Called once per resolved pose, in ascending sensor order within a frame.
    fn report(&mut self, pose: &SensorPose) -> Result<()>;

    /// Called once when the session ends.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl PoseSink for Vec<SensorPose> {
    fn report(&mut self, pose: &SensorPose) -> Result<()> {
        self.push(*pose);
        Ok(())
    }
}

/// Writes `Sensor N: Translation (x, y, z) rotation (w, x, y, z)` lines.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PoseSink for TextSink<W> {
    fn report(&mut self, pose: &SensorPose) -> Result<()> {
        writeln!(self.out, "{}", pose).context("write pose line")
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flush pose output")
    }
}

#[derive(Serialize)]
struct PoseRecord {
    sensor: usize,
    translation: [f64; 3],
    /// w, x, y, z
    rotation: [f64; 4],
}

impl From<&SensorPose> for PoseRecord {
    fn from(pose: &SensorPose) -> Self {
        let t = &pose.pose.translation;
        let q = pose.pose.rotation.quaternion();
        Self {
            sensor: pose.sensor,
            translation: [t.x, t.y, t.z],
            rotation: [q.w, q.i, q.j, q.k],
        }
    }
}

/// Writes one JSON object per line: `{"sensor":0,"translation":[..],"rotation":[w,x,y,z]}`.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PoseSink for JsonLinesSink<W> {
    fn report(&mut self, pose: &SensorPose) -> Result<()> {
        serde_json::to_writer(&mut self.out, &PoseRecord::from(pose))
            .context("serialize pose record")?;
        self.out.write_all(b"\n").context("write pose record")
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flush pose output")
    }
}

// ----------------------------------------------------------------------------
// Output selection
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" | "jsonl" => Ok(OutputFormat::Json),
            other => Err(anyhow!("unknown output format '{}' (expected text or json)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// Build the sink for `format` over `out`.
pub fn sink_for<'a, W: Write + 'a>(format: OutputFormat, out: W) -> Box<dyn PoseSink + 'a> {
    match format {
        OutputFormat::Text => Box::new(TextSink::new(out)),
        OutputFormat::Json => Box::new(JsonLinesSink::new(out)),
    }
}
