use nalgebra::{UnitQuaternion, Vector3};
use std::fmt;

/// Position and orientation of a sensor for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// A pose resolved for one registered sensor. `sensor` is the registration index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorPose {
    pub sensor: usize,
    pub pose: Pose,
}

impl SensorPose {
    pub fn new(sensor: usize, pose: Pose) -> Self {
        Self { sensor, pose }
    }
}

impl fmt::Display for SensorPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.pose.translation;
        let q = self.pose.rotation.quaternion();
        write!(
            f,
            "Sensor {}: Translation ({:.4}, {:.4}, {:.4}) rotation ({:.4}, {:.4}, {:.4}, {:.4})",
            self.sensor, t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reports_translation_then_wxyz_rotation() {
        let pose = SensorPose::new(
            1,
            Pose::new(Vector3::new(1.0, -2.5, 300.0), UnitQuaternion::identity()),
        );
        assert_eq!(
            pose.to_string(),
            concat!(
                "Sensor 1: Translation (1.0000, -2.5000, 300.0000) ",
                "rotation (1.0000, 0.0000, 0.0000, 0.0000)"
            )
        );
    }
}
