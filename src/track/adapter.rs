use anyhow::{anyhow, Context, Result};
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use std::time::SystemTime;

use crate::camera::CameraParameters;
use crate::frame::Frame;
use crate::geometry::MarkerGeometry;
use crate::sink::PoseSink;
use crate::track::engine::TrackingEngine;
use crate::track::identifier::LedIdentifier;

/// One logical sensor known to the tracking engine. Immutable once registered.
pub struct SensorRegistration {
    identifier: Box<dyn LedIdentifier>,
    camera: Arc<CameraParameters>,
    geometry: MarkerGeometry,
}

impl SensorRegistration {
    pub fn identifier(&self) -> &dyn LedIdentifier {
        self.identifier.as_ref()
    }

    pub fn camera(&self) -> &CameraParameters {
        &self.camera
    }

    pub fn geometry(&self) -> &MarkerGeometry {
        &self.geometry
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.geometry.positions
    }

    pub fn directions(&self) -> &[Vector3<f64>] {
        &self.geometry.directions
    }
}

/// Outcome of dispatching one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Poses forwarded to the sink.
    pub poses_reported: usize,
    /// The engine asked the loop to stop.
    pub done: bool,
}

/// Owns the tracking engine and the sensors registered with it.
///
/// Sensor indices are assigned in registration order and are the indices every
/// reported pose refers to. Registration closes when the first frame is
/// processed.
pub struct TrackingAdapter<E> {
    engine: E,
    sensors: Vec<SensorRegistration>,
    frames_processed: u64,
}

impl<E: TrackingEngine> TrackingAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            sensors: Vec::new(),
            frames_processed: 0,
        }
    }

    /// Register a sensor and return its index.
    pub fn register_sensor(
        &mut self,
        identifier: Box<dyn LedIdentifier>,
        camera: Arc<CameraParameters>,
        positions: Vec<Point3<f64>>,
        directions: Vec<Vector3<f64>>,
    ) -> Result<usize> {
        if self.frames_processed > 0 {
            return Err(anyhow!(
                "sensors must be registered before the first frame is processed"
            ));
        }
        let index = self.sensors.len();
        let geometry = MarkerGeometry::new(positions, directions)
            .with_context(|| format!("sensor {} registration", index))?;
        log::debug!(
            "registered sensor {} ({} identifier, {} LEDs)",
            index,
            identifier.name(),
            geometry.len()
        );
        self.sensors.push(SensorRegistration {
            identifier,
            camera,
            geometry,
        });
        Ok(index)
    }

    pub fn sensors(&self) -> &[SensorRegistration] {
        &self.sensors
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Run the engine over a frame pair and forward its poses to `sink`.
    ///
    /// Poses reach the sink in ascending sensor order whatever order the engine
    /// produced them in, at most one per sensor. Poses for unregistered indices
    /// are dropped, and of duplicates only the first reported is kept.
    pub fn process_frame(
        &mut self,
        color: &Frame,
        gray: &Frame,
        timestamp: SystemTime,
        sink: &mut dyn PoseSink,
    ) -> Result<Dispatch> {
        if self.sensors.is_empty() {
            return Err(anyhow!("no sensors registered"));
        }
        if color.dimensions() != gray.dimensions() {
            return Err(anyhow!(
                "color frame is {} but grayscale frame is {}",
                color.dimensions(),
                gray.dimensions()
            ));
        }

        self.frames_processed += 1;
        let mut report = self
            .engine
            .process(&self.sensors, color, gray, timestamp)
            .with_context(|| format!("{} engine failed", self.engine.name()))?;

        let registered = self.sensors.len();
        report.poses.retain(|pose| {
            if pose.sensor < registered {
                true
            } else {
                log::warn!(
                    "{} engine reported unregistered sensor {}",
                    self.engine.name(),
                    pose.sensor
                );
                false
            }
        });
        report.poses.sort_by_key(|pose| pose.sensor);
        let resolved = report.poses.len();
        report.poses.dedup_by_key(|pose| pose.sensor);
        if report.poses.len() < resolved {
            log::warn!(
                "{} engine reported {} duplicate poses; keeping the first per sensor",
                self.engine.name(),
                resolved - report.poses.len()
            );
        }

        for pose in &report.poses {
            sink.report(pose).context("report pose")?;
        }

        Ok(Dispatch {
            poses_reported: report.poses.len(),
            done: report.done,
        })
    }
}
