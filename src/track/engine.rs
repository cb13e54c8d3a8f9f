use anyhow::Result;
use std::time::SystemTime;

use crate::frame::Frame;
use crate::track::adapter::SensorRegistration;
use crate::track::pose::SensorPose;

/// What the engine resolved for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineReport {
    /// Poses for sensors resolved this frame, at most one per sensor.
    pub poses: Vec<SensorPose>,
    /// The engine wants the capture loop to stop.
    pub done: bool,
}

/// External detection and pose-estimation pipeline.
///
/// The harness treats the engine as opaque: it hands over a color/grayscale
/// frame pair and gets back poses plus a stop flag. Frames are only borrowed
/// for the call; engines copy whatever they keep between frames.
pub trait TrackingEngine {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Run detection and pose estimation over one frame pair.
    fn process(
        &mut self,
        sensors: &[SensorRegistration],
        color: &Frame,
        gray: &Frame,
        timestamp: SystemTime,
    ) -> Result<EngineReport>;
}

impl<E: TrackingEngine + ?Sized> TrackingEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process(
        &mut self,
        sensors: &[SensorRegistration],
        color: &Frame,
        gray: &Frame,
        timestamp: SystemTime,
    ) -> Result<EngineReport> {
        (**self).process(sensors, color, gray, timestamp)
    }
}
