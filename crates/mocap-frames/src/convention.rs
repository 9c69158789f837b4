//! Axis conventions.
//!
//! The tracking service reports in NUE axes: X = right, Y = up, Z = forward.
//! Downstream consumers want one of two right-handed navigation frames:
//!
//! | Output | X | Y | Z |
//! |---|---|---|---|
//! | ENU | East  = native Z | North = native X | Up   = native Y  |
//! | NED | North = native X | East  = native Z | Down = −native Y |
//!
//! Positions are relabelled axis by axis.  Orientations keep the rotation they
//! represent and only change the reference frame they are expressed in:
//! `q_out = inverse(native→out) * q_native_body`.

use std::f64::consts::FRAC_PI_2;
use std::sync::LazyLock;

use mocap_types::{Quaternion, Vec3};

/// The two fixed native → output rotations, with their inverses.
///
/// Derived once per process from constant Euler angles; see
/// [`FixedRotations::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRotations {
    /// roll 0, pitch −90°, yaw −90°
    pub nue_to_enu: Quaternion,
    /// roll −90°, pitch 0, yaw 0
    pub nue_to_ned: Quaternion,
    enu_inverse: Quaternion,
    ned_inverse: Quaternion,
}

static FIXED_ROTATIONS: LazyLock<FixedRotations> = LazyLock::new(FixedRotations::compute);

impl FixedRotations {
    fn compute() -> Self {
        let nue_to_enu = Quaternion::from_rpy(0.0, -FRAC_PI_2, -FRAC_PI_2);
        let nue_to_ned = Quaternion::from_rpy(-FRAC_PI_2, 0.0, 0.0);
        Self {
            nue_to_enu,
            nue_to_ned,
            enu_inverse: nue_to_enu.inverse(),
            ned_inverse: nue_to_ned.inverse(),
        }
    }

    /// The process-wide constants.  Read-only, shared by every handler.
    pub fn get() -> &'static Self {
        &FIXED_ROTATIONS
    }

    /// Rotation from native axes into `convention`.
    pub fn rotation(&self, convention: Convention) -> Quaternion {
        match convention {
            Convention::Enu => self.nue_to_enu,
            Convention::Ned => self.nue_to_ned,
        }
    }

    /// Inverse of [`rotation`](Self::rotation).
    pub fn inverse(&self, convention: Convention) -> Quaternion {
        match convention {
            Convention::Enu => self.enu_inverse,
            Convention::Ned => self.ned_inverse,
        }
    }
}

/// Output navigation convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// East-North-Up.
    Enu,
    /// North-East-Down.
    Ned,
}

impl Convention {
    /// Emission order for one sample.
    pub const ALL: [Convention; 2] = [Convention::Enu, Convention::Ned];

    /// Topic suffix, e.g. `"_enu"`.
    pub fn topic_suffix(self) -> &'static str {
        match self {
            Convention::Enu => "_enu",
            Convention::Ned => "_ned",
        }
    }

    /// Relabel a native position into this convention's axes.
    pub fn remap_position(self, native: Vec3) -> Vec3 {
        match self {
            Convention::Enu => Vec3::new(native.z, native.x, native.y),
            Convention::Ned => Vec3::new(native.x, native.z, -native.y),
        }
    }

    /// Re-express a native body orientation in this convention.
    pub fn remap_orientation(self, native_body: Quaternion) -> Quaternion {
        FixedRotations::get().inverse(self) * native_body
    }
}

impl std::fmt::Display for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Convention::Enu => write!(f, "enu"),
            Convention::Ned => write!(f, "ned"),
        }
    }
}
