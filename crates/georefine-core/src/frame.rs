use crate::geodesy::Ellipsoid;
use nalgebra::{Point3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Coordinate reference system of the world frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crs {
    /// World coordinates are already metric and locally Cartesian
    /// (projected CRS or no CRS at all).
    #[default]
    Local,
    /// World coordinates are geocentric (ECEF) and reference positions are
    /// geodetic `(lon°, lat°, h)` on this ellipsoid.
    Geodetic(Ellipsoid),
}

/// Similarity transform from the engine's chunk-local frame into world
/// coordinates, plus the CRS those coordinates live in.
///
/// Maps points as `p' = s * R * p + t`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldFrame {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
    #[serde(default)]
    pub crs: Crs,
}

impl WorldFrame {
    /// Identity transform in a local metric CRS.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
            crs: Crs::Local,
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>, scale: f64) -> Self {
        Self {
            rotation,
            translation,
            scale,
            crs: Crs::Local,
        }
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    /// Map a chunk-local point into world coordinates.
    #[inline]
    pub fn to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.scale * (self.rotation * p.coords) + self.translation)
    }

    /// Rotation part only; directions and metric offsets are not scaled.
    #[inline]
    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        self.rotation.to_rotation_matrix()
    }

    /// Reference position in world coordinates.
    pub fn reference_to_world(&self, reference: &Point3<f64>) -> Point3<f64> {
        match self.crs {
            Crs::Local => *reference,
            Crs::Geodetic(ellipsoid) => ellipsoid.geodetic_to_ecef(reference),
        }
    }

    /// Rotation from world directions into the local level frame at `world`.
    ///
    /// Identity for local CRS, ENU tangent plane for geodetic ones.
    pub fn level_frame_at(&self, world: &Point3<f64>) -> Rotation3<f64> {
        match self.crs {
            Crs::Local => Rotation3::identity(),
            Crs::Geodetic(ellipsoid) => ellipsoid.local_frame(world),
        }
    }
}

impl Default for WorldFrame {
    fn default() -> Self {
        Self::identity()
    }
}
