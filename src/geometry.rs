//! Marker geometry tables.
//!
//! Each physical sensor carries a fixed set of LEDs: a 3D position per LED and
//! the direction it emits along, both in the sensor's body frame. Tables are
//! indexed by sensor slot and never change after startup.
//!
//! Tables come from a JSON file when one is configured:
//!
//! ```json
//! { "sensors": [ { "positions": [[0.0, 40.0, 0.0]], "directions": [[0.0, 0.0, 1.0]] } ] }
//! ```
//!
//! Otherwise `GeometryTable::reference()` supplies a two-sensor layout that
//! matches the synthetic source's marker ring.

use anyhow::{anyhow, Context, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::path::Path;

/// LED positions and emission directions for one sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerGeometry {
    pub positions: Vec<Point3<f64>>,
    pub directions: Vec<Vector3<f64>>,
}

impl MarkerGeometry {
    /// Build a geometry, normalizing directions.
    pub fn new(positions: Vec<Point3<f64>>, directions: Vec<Vector3<f64>>) -> Result<Self> {
        let geometry = Self {
            positions,
            directions,
        };
        geometry.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.positions.is_empty() {
            return Err(anyhow!("marker geometry needs at least one LED"));
        }
        if self.positions.len() != self.directions.len() {
            return Err(anyhow!(
                "marker geometry has {} positions but {} directions",
                self.positions.len(),
                self.directions.len()
            ));
        }
        for (index, direction) in self.directions.iter_mut().enumerate() {
            let norm = direction.norm();
            if !norm.is_finite() || norm == 0.0 {
                return Err(anyhow!("LED {} has a degenerate direction", index));
            }
            *direction /= norm;
        }
        Ok(self)
    }

    /// Number of LEDs.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeometryFile {
    sensors: Vec<MarkerGeometry>,
}

/// Per-slot marker geometry for every sensor the harness registers.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryTable {
    sensors: Vec<MarkerGeometry>,
}

impl GeometryTable {
    pub fn new(sensors: Vec<MarkerGeometry>) -> Result<Self> {
        if sensors.is_empty() {
            return Err(anyhow!("geometry table must describe at least one sensor"));
        }
        Ok(Self { sensors })
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: GeometryFile = serde_json::from_str(raw).context("parse geometry table")?;
        let sensors = file
            .sensors
            .into_iter()
            .enumerate()
            .map(|(slot, geometry)| {
                geometry
                    .validated()
                    .with_context(|| format!("sensor {} geometry", slot))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(sensors)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read geometry table {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("geometry table {}", path.display()))
    }

    /// Two-sensor reference layout, in millimeters.
    ///
    /// Slot 0 is a front plate with eight LEDs on a 40 mm ring facing +Z.
    /// Slot 1 is a rear plate with four LEDs on a 30 mm square facing -Z.
    pub fn reference() -> Self {
        let front_positions = (0..8)
            .map(|i| {
                let angle = TAU * i as f64 / 8.0;
                Point3::new(40.0 * angle.cos(), 40.0 * angle.sin(), 0.0)
            })
            .collect::<Vec<_>>();
        let front_directions = vec![Vector3::z(); front_positions.len()];

        let rear_positions = [(-15.0, -15.0), (15.0, -15.0), (15.0, 15.0), (-15.0, 15.0)]
            .into_iter()
            .map(|(x, y)| Point3::new(x, y, -80.0))
            .collect::<Vec<_>>();
        let rear_directions = vec![-Vector3::z(); rear_positions.len()];

        Self {
            sensors: vec![
                MarkerGeometry {
                    positions: front_positions,
                    directions: front_directions,
                },
                MarkerGeometry {
                    positions: rear_positions,
                    directions: rear_directions,
                },
            ],
        }
    }

    pub fn get(&self, slot: usize) -> Option<&MarkerGeometry> {
        self.sensors.get(slot)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerGeometry> {
        self.sensors.iter()
    }
}
