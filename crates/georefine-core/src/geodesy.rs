//! Reference ellipsoids and local tangent-plane frames.
//!
//! Geodetic coordinates are `(longitude°, latitude°, ellipsoidal height m)`
//! stored in a `Point3` in that order. Geocentric coordinates are ECEF
//! metres. Local frames are East-North-Up.

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rotational ellipsoid defined by its semi-major axis and inverse flattening.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub semi_major: f64,
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        semi_major: 6_378_137.0,
        inverse_flattening: 298.257_223_563,
    };

    #[inline]
    pub fn flattening(&self) -> f64 {
        1.0 / self.inverse_flattening
    }

    /// First eccentricity squared.
    #[inline]
    pub fn e2(&self) -> f64 {
        let f = self.flattening();
        f * (2.0 - f)
    }

    /// Prime vertical radius of curvature at geodetic latitude `lat` (radians).
    #[inline]
    fn prime_vertical_radius(&self, lat: f64) -> f64 {
        let s = lat.sin();
        self.semi_major / (1.0 - self.e2() * s * s).sqrt()
    }

    /// Geodetic `(lon°, lat°, h)` to ECEF metres.
    pub fn geodetic_to_ecef(&self, geodetic: &Point3<f64>) -> Point3<f64> {
        let lon = geodetic.x.to_radians();
        let lat = geodetic.y.to_radians();
        let h = geodetic.z;
        let n = self.prime_vertical_radius(lat);
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        Point3::new(
            (n + h) * cos_lat * cos_lon,
            (n + h) * cos_lat * sin_lon,
            (n * (1.0 - self.e2()) + h) * sin_lat,
        )
    }

    /// ECEF metres to geodetic `(lon°, lat°, h)`.
    ///
    /// Fixed-point iteration on latitude; converges to sub-millimetre height
    /// within a handful of steps for any terrestrial or airborne point.
    pub fn ecef_to_geodetic(&self, ecef: &Point3<f64>) -> Point3<f64> {
        let e2 = self.e2();
        let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
        let lon = ecef.y.atan2(ecef.x);

        let mut lat = ecef.z.atan2(p * (1.0 - e2));
        let mut h = 0.0;
        for _ in 0..8 {
            let n = self.prime_vertical_radius(lat);
            let (sin_lat, cos_lat) = lat.sin_cos();
            h = p * cos_lat + (ecef.z + e2 * n * sin_lat) * sin_lat - n;
            let next = (ecef.z + e2 * n * sin_lat).atan2(p);
            let done = (next - lat).abs() < 1e-14;
            lat = next;
            if done {
                break;
            }
        }

        Point3::new(lon.to_degrees(), lat.to_degrees(), h)
    }

    /// Rotation taking ECEF direction vectors into the ENU frame tangent to
    /// the ellipsoid under `ecef`.
    pub fn local_frame(&self, ecef: &Point3<f64>) -> Rotation3<f64> {
        let geodetic = self.ecef_to_geodetic(ecef);
        enu_rotation(geodetic.x.to_radians(), geodetic.y.to_radians())
    }

    /// Ground distance in metres between two geodetic points, measured as the
    /// chord between their ECEF positions.
    pub fn chord_distance(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        (self.geodetic_to_ecef(a) - self.geodetic_to_ecef(b)).norm()
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

/// ECEF→ENU rotation at longitude/latitude given in radians.
fn enu_rotation(lon: f64, lat: f64) -> Rotation3<f64> {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let m = Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    );
    Rotation3::from_matrix_unchecked(m)
}

/// Offset `to - from` expressed in the ENU frame at `from` (both ECEF).
pub fn enu_offset(ellipsoid: &Ellipsoid, from: &Point3<f64>, to: &Point3<f64>) -> Vector3<f64> {
    ellipsoid.local_frame(from) * (to - from)
}
