//! Standalone harness for the video-based LED tracker.
//!
//! Drives a camera, converts each captured frame to grayscale, hands the
//! color/grayscale pair to a tracking engine and prints the per-sensor poses
//! the engine resolves.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (synthetic, V4L2, still image) and pixel decoding
//! - `classify`: rejects cameras whose reported format cannot be trusted
//! - `camera`, `geometry`: camera intrinsics and LED marker tables
//! - `track`: tracking engine seam, sensor registration, pose types
//! - `sink`: pose output
//! - `session`: the capture-and-dispatch loop
//! - `config`: startup configuration

pub mod camera;
pub mod classify;
pub mod config;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod session;
pub mod sink;
pub mod track;

pub use camera::CameraParameters;
pub use classify::DeviceClass;
pub use config::{HarnessConfig, Overrides};
pub use frame::{Dimensions, Frame, PixelLayout};
pub use geometry::{GeometryTable, MarkerGeometry};
pub use ingest::{open_device, ChannelOrder, DeviceSpec, FrameSource};
pub use session::{RunSummary, Session, SessionOptions, SessionState, Step, TerminationReason};
pub use sink::{sink_for, OutputFormat, PoseSink};
pub use track::{Pose, SensorPose, StubEngine, TrackingAdapter, TrackingEngine};
