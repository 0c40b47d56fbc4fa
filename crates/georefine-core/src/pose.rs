use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Identifier of a pose (one per input image).
pub type PoseId = u32;

/// Yaw/pitch/roll attitude in degrees.
///
/// The angles compose as `Rz(yaw) * Ry(pitch) * Rx(roll)` and describe the
/// camera body axes (x right, y up, z backwards along the optical axis) in
/// the local level frame the reference attitudes are recorded in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ypr {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Ypr {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Decompose a rotation matrix into yaw/pitch/roll.
    pub fn from_rotation(r: &Rotation3<f64>) -> Self {
        let (roll, pitch, yaw) = r.euler_angles();
        Self {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        }
    }

    pub fn to_rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(
            self.roll.to_radians(),
            self.pitch.to_radians(),
            self.yaw.to_radians(),
        )
    }

    /// Component-wise `self - other`, each wrapped into (-180°, 180°].
    pub fn wrapped_difference(&self, other: &Ypr) -> Vector3<f64> {
        Vector3::new(
            wrap_degrees(self.yaw - other.yaw),
            wrap_degrees(self.pitch - other.pitch),
            wrap_degrees(self.roll - other.roll),
        )
    }
}

/// Wrap an angle in degrees into (-180°, 180°].
pub fn wrap_degrees(mut deg: f64) -> f64 {
    if !deg.is_finite() {
        return deg;
    }
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg <= -180.0 {
        deg += 360.0;
    }
    deg
}

/// Axis flip between the engine camera frame (y down, z forward) and the
/// body frame used for attitudes and antenna offsets.
#[inline]
pub fn camera_axis_flip() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

/// One camera station: the engine's estimate and the externally measured
/// reference for the same image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub id: PoseId,
    #[serde(default)]
    pub label: String,
    /// Camera centre in the engine's chunk-local frame. `None` when the
    /// reconstruction could not localize this image.
    #[serde(default)]
    pub estimated_position: Option<Point3<f64>>,
    /// Camera-to-chunk rotation in the engine camera frame.
    #[serde(default)]
    pub estimated_orientation: Option<Rotation3<f64>>,
    /// Reference position in the world CRS: `(lon°, lat°, h)` when the frame
    /// is geodetic, metric coordinates otherwise.
    pub reference_position: Point3<f64>,
    #[serde(default)]
    pub reference_orientation: Option<Ypr>,
    /// GNSS antenna phase-centre offset from the camera centre, in metres,
    /// in body-frame axes.
    #[serde(default)]
    pub antenna_offset: Option<Vector3<f64>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Pose {
    /// A pose with only a reference position; not yet localized.
    pub fn new(id: PoseId, reference_position: Point3<f64>) -> Self {
        Self {
            id,
            label: String::new(),
            estimated_position: None,
            estimated_orientation: None,
            reference_position,
            reference_orientation: None,
            antenna_offset: None,
            enabled: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_estimate(mut self, position: Point3<f64>) -> Self {
        self.estimated_position = Some(position);
        self
    }

    pub fn with_orientations(mut self, estimated: Rotation3<f64>, reference: Ypr) -> Self {
        self.estimated_orientation = Some(estimated);
        self.reference_orientation = Some(reference);
        self
    }

    pub fn with_antenna_offset(mut self, offset: Vector3<f64>) -> Self {
        self.antenna_offset = Some(offset);
        self
    }

    /// Whether the reconstruction produced a position for this pose.
    #[inline]
    pub fn is_localized(&self) -> bool {
        self.estimated_position.is_some()
    }
}
