//! Pinhole camera parameters shared by every registered sensor.

use anyhow::{anyhow, Result};
use nalgebra::{Matrix3, Point2, Point3};

use crate::frame::Dimensions;

/// Placeholder focal length, in pixels, used until a calibration is available.
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 700.0;

/// Intrinsics of the capture camera. No distortion model.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParameters {
    pub fx: f64,
    pub fy: f64,
    pub principal_point: Point2<f64>,
    pub size: Dimensions,
}

impl CameraParameters {
    /// Square-pixel parameters centered on the frame.
    pub fn from_dimensions(size: Dimensions, focal_length_px: f64) -> Result<Self> {
        Self::new(focal_length_px, focal_length_px, size)
    }

    pub fn new(fx: f64, fy: f64, size: Dimensions) -> Result<Self> {
        if size.is_empty() {
            return Err(anyhow!("camera size must be non-zero, got {}", size));
        }
        for (name, value) in [("fx", fx), ("fy", fy)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow!("{} must be a positive pixel count, got {}", name, value));
            }
        }
        Ok(Self {
            fx,
            fy,
            principal_point: Point2::new(size.width as f64 / 2.0, size.height as f64 / 2.0),
            size,
        })
    }

    /// The 3x3 intrinsic matrix `K`.
    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx,
            0.0,
            self.principal_point.x,
            0.0,
            self.fy,
            self.principal_point.y,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Project a camera-frame point to pixel coordinates. `None` behind the camera.
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        if point.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            self.fx * point.x / point.z + self.principal_point.x,
            self.fy * point.y / point.z + self.principal_point.y,
        ))
    }

    /// Lift a pixel to the camera-frame point at depth `z`.
    pub fn back_project(&self, pixel: &Point2<f64>, z: f64) -> Point3<f64> {
        Point3::new(
            (pixel.x - self.principal_point.x) / self.fx * z,
            (pixel.y - self.principal_point.y) / self.fy * z,
            z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_point_is_frame_center() -> Result<()> {
        let cam = CameraParameters::from_dimensions(Dimensions::new(640, 480), 700.0)?;
        assert_eq!(cam.principal_point, Point2::new(320.0, 240.0));
        assert_eq!(cam.fx, 700.0);
        assert_eq!(cam.fy, 700.0);
        assert_eq!(cam.intrinsic_matrix()[(0, 2)], 320.0);
        assert_eq!(cam.intrinsic_matrix()[(2, 2)], 1.0);
        Ok(())
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(CameraParameters::from_dimensions(Dimensions::new(0, 480), 700.0).is_err());
        assert!(CameraParameters::from_dimensions(Dimensions::new(640, 480), 0.0).is_err());
        assert!(CameraParameters::from_dimensions(Dimensions::new(640, 480), f64::NAN).is_err());
    }

    #[test]
    fn back_projection_inverts_projection() -> Result<()> {
        let cam = CameraParameters::from_dimensions(Dimensions::new(640, 480), 700.0)?;
        let point = Point3::new(12.5, -4.0, 250.0);
        let pixel = cam.project(&point).expect("in front of camera");
        let lifted = cam.back_project(&pixel, point.z);
        assert!((lifted - point).norm() < 1e-9);
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
        Ok(())
    }
}
