//! Converting metric ground sample distances into CRS units.

use georefine_core::Ellipsoid;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Step used to measure the local scale, in degrees.
const SCALE_STEP_DEG: f64 = 0.01;

/// Ground metres covered by one CRS unit along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetresPerUnit {
    pub x: f64,
    pub y: f64,
}

impl MetresPerUnit {
    /// Projected CRS: coordinates are already metres.
    pub const METRIC: MetresPerUnit = MetresPerUnit { x: 1.0, y: 1.0 };

    /// Metres per degree of longitude and latitude around `(lon, lat)`.
    ///
    /// Measured as the chord of a 0.01° step on the ellipsoid surface,
    /// scaled back up to one degree.
    pub fn around(ellipsoid: &Ellipsoid, lon: f64, lat: f64) -> Self {
        let origin = Point3::new(lon, lat, 0.0);
        let east = Point3::new(lon + SCALE_STEP_DEG, lat, 0.0);
        let north = Point3::new(lon, lat + SCALE_STEP_DEG, 0.0);
        Self {
            x: ellipsoid.chord_distance(&origin, &east) / SCALE_STEP_DEG,
            y: ellipsoid.chord_distance(&origin, &north) / SCALE_STEP_DEG,
        }
    }

    /// Pixel step `(dx, dy)` in CRS units for a ground sample distance in
    /// metres.
    #[inline]
    pub fn crs_step(&self, gsd: f64) -> (f64, f64) {
        (gsd / self.x, gsd / self.y)
    }
}

impl Default for MetresPerUnit {
    fn default() -> Self {
        Self::METRIC
    }
}

/// Width and height of a raster footprint in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricExtent {
    pub size_x: f64,
    pub size_y: f64,
}

/// Longitude/latitude bounding box in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn centre(&self) -> (f64, f64) {
        (
            0.5 * (self.west + self.east),
            0.5 * (self.south + self.north),
        )
    }

    /// Scale at the box centre.
    pub fn metres_per_degree(&self, ellipsoid: &Ellipsoid) -> MetresPerUnit {
        let (lon, lat) = self.centre();
        MetresPerUnit::around(ellipsoid, lon, lat)
    }

    /// Metric footprint of the box, using the scale at its centre.
    pub fn metric_extent(&self, ellipsoid: &Ellipsoid) -> MetricExtent {
        let scale = self.metres_per_degree(ellipsoid);
        MetricExtent {
            size_x: (self.east - self.west) * scale.x,
            size_y: (self.north - self.south) * scale.y,
        }
    }
}
