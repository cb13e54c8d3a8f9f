use anyhow::{anyhow, Result};
use nalgebra::{Point2, UnitQuaternion};
use std::time::SystemTime;

use crate::frame::{Frame, PixelLayout};
use crate::track::adapter::SensorRegistration;
use crate::track::engine::{EngineReport, TrackingEngine};
use crate::track::pose::{Pose, SensorPose};

const DEFAULT_THRESHOLD: u8 = 200;
const DEFAULT_MIN_PIXELS: usize = 4;
/// Assumed distance to the markers, in millimeters.
const DEFAULT_DEPTH_MM: f64 = 500.0;

/// Stand-in engine for running the harness without the real tracker.
///
/// Finds the centroid of all pixels at or above a brightness threshold and
/// back-projects it through each sensor's camera at a fixed depth. Rotation is
/// always identity. There is no LED identification, so every registered sensor
/// gets the same position whenever enough bright pixels are present.
#[derive(Clone, Debug)]
pub struct StubEngine {
    threshold: u8,
    min_pixels: usize,
    depth: f64,
    done_after: Option<u64>,
    frames_seen: u64,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_pixels: DEFAULT_MIN_PIXELS,
            depth: DEFAULT_DEPTH_MM,
            done_after: None,
            frames_seen: 0,
        }
    }

    /// Signal completion once this many frames were processed.
    pub fn with_done_after(mut self, frames: u64) -> Self {
        self.done_after = Some(frames);
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    fn bright_centroid(&self, gray: &Frame) -> Option<Point2<f64>> {
        let width = gray.width() as usize;
        if width == 0 {
            return None;
        }
        let (mut sx, mut sy, mut count) = (0.0, 0.0, 0usize);
        for (index, &value) in gray.pixels().iter().enumerate() {
            if value >= self.threshold {
                sx += (index % width) as f64;
                sy += (index / width) as f64;
                count += 1;
            }
        }
        if count < self.min_pixels {
            return None;
        }
        Some(Point2::new(sx / count as f64, sy / count as f64))
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn process(
        &mut self,
        sensors: &[SensorRegistration],
        _color: &Frame,
        gray: &Frame,
        _timestamp: SystemTime,
    ) -> Result<EngineReport> {
        if gray.layout() != PixelLayout::Gray8 {
            return Err(anyhow!("stub engine expects a grayscale frame"));
        }
        self.frames_seen += 1;

        let poses = match self.bright_centroid(gray) {
            Some(centroid) => sensors
                .iter()
                .enumerate()
                .map(|(index, sensor)| {
                    let position = sensor.camera().back_project(&centroid, self.depth);
                    SensorPose::new(index, Pose::new(position.coords, UnitQuaternion::identity()))
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(EngineReport {
            poses,
            done: self.done_after.is_some_and(|limit| self.frames_seen >= limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraParameters;
    use crate::frame::Dimensions;
    use crate::geometry::GeometryTable;
    use crate::track::adapter::TrackingAdapter;
    use crate::track::identifier::SlotIdentifier;
    use std::sync::Arc;

    fn gray_with_spot(dims: Dimensions, spot: (u32, u32)) -> Frame {
        let mut data = vec![10u8; dims.pixel_count().unwrap()];
        for dy in 0..2 {
            for dx in 0..2 {
                let x = (spot.0 + dx) as usize;
                let y = (spot.1 + dy) as usize;
                data[y * dims.width as usize + x] = 255;
            }
        }
        Frame::from_pixels(dims, PixelLayout::Gray8, data).unwrap()
    }

    fn registered(engine: StubEngine, dims: Dimensions) -> TrackingAdapter<StubEngine> {
        let mut adapter = TrackingAdapter::new(engine);
        let camera = Arc::new(CameraParameters::from_dimensions(dims, 100.0).unwrap());
        for (slot, geometry) in GeometryTable::reference().iter().enumerate() {
            adapter
                .register_sensor(
                    Box::new(SlotIdentifier::new(slot)),
                    camera.clone(),
                    geometry.positions.clone(),
                    geometry.directions.clone(),
                )
                .unwrap();
        }
        adapter
    }

    #[test]
    fn centered_spot_maps_to_optical_axis() -> Result<()> {
        let dims = Dimensions::new(20, 10);
        let mut adapter = registered(StubEngine::new(), dims);
        // 2x2 spot at (9..=10, 4..=5) has centroid (9.5, 4.5); principal point is (10, 5).
        let gray = gray_with_spot(dims, (9, 4));
        let color = Frame::from_pixels(dims, PixelLayout::Rgb8, vec![0; 600])?;

        let mut sink: Vec<SensorPose> = Vec::new();
        let dispatch = adapter.process_frame(&color, &gray, SystemTime::now(), &mut sink)?;
        assert_eq!(dispatch.poses_reported, 2);
        assert!(!dispatch.done);

        let t = sink[0].pose.translation;
        assert!((t.x - (-0.5 / 100.0 * 500.0)).abs() < 1e-9);
        assert!((t.y - (-0.5 / 100.0 * 500.0)).abs() < 1e-9);
        assert_eq!(t.z, 500.0);
        assert_eq!(sink[1].sensor, 1);
        Ok(())
    }

    #[test]
    fn dark_frames_resolve_nothing() -> Result<()> {
        let dims = Dimensions::new(8, 8);
        let mut engine = StubEngine::new();
        let gray = Frame::from_pixels(dims, PixelLayout::Gray8, vec![50; 64])?;
        let report = engine.process(&[], &gray, &gray, SystemTime::now())?;
        assert!(report.poses.is_empty());
        assert_eq!(engine.frames_seen(), 1);
        Ok(())
    }

    #[test]
    fn done_after_signals_completion() -> Result<()> {
        let dims = Dimensions::new(8, 8);
        let mut engine = StubEngine::new().with_done_after(2);
        let gray = Frame::from_pixels(dims, PixelLayout::Gray8, vec![0; 64])?;
        assert!(!engine.process(&[], &gray, &gray, SystemTime::now())?.done);
        assert!(engine.process(&[], &gray, &gray, SystemTime::now())?.done);
        Ok(())
    }

    #[test]
    fn threshold_is_configurable() -> Result<()> {
        let dims = Dimensions::new(4, 1);
        let gray = Frame::from_pixels(dims, PixelLayout::Gray8, vec![120; 4])?;
        let strict = StubEngine::new();
        let lenient = StubEngine::new().with_threshold(100);
        assert!(strict.bright_centroid(&gray).is_none());
        assert_eq!(lenient.bright_centroid(&gray), Some(Point2::new(1.5, 0.0)));
        Ok(())
    }

    #[test]
    fn rejects_color_input() {
        let dims = Dimensions::new(1, 1);
        let color = Frame::from_pixels(dims, PixelLayout::Rgb8, vec![0; 3]).unwrap();
        assert!(StubEngine::new()
            .process(&[], &color, &color, SystemTime::now())
            .is_err());
    }
}
