//! Geometry primitives shared by every MoCap crate.
//!
//! Quaternions follow the ROS message layout `(x, y, z, w)` and the Hamilton
//! product convention.  All arithmetic is `f64`; tracking systems report
//! sub-millimetre positions and the frame changes must not lose precision
//! beyond floating-point rounding.

use std::ops::{Mul, Neg};

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (position or translation, metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A rotation quaternion in `(x, y, z, w)` layout.
///
/// Nothing here enforces unit norm.  Callers that receive quaternions from
/// the outside world decide whether to [`normalize`](Quaternion::normalize).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Build a rotation from fixed-axis roll, pitch and yaw (radians).
    ///
    /// Equivalent to `Rz(yaw) * Ry(pitch) * Rx(roll)`, the same composition
    /// `tf2::Quaternion::setRPY` uses.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();

        Self::new(
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
            cr * cp * cy + sr * sp * sy,
        )
    }

    pub fn norm_squared(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn norm(self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Multiplicative inverse: conjugate divided by the squared norm.
    pub fn inverse(self) -> Self {
        let n2 = self.norm_squared();
        let c = self.conjugate();
        Self::new(c.x / n2, c.y / n2, c.z / n2, c.w / n2)
    }

    /// Scale to unit norm.  The zero quaternion has no direction and maps to
    /// the identity.
    pub fn normalize(self) -> Self {
        let n = self.norm();
        if n == 0.0 || !n.is_finite() {
            return Self::identity();
        }
        Self::new(self.x / n, self.y / n, self.z / n, self.w / n)
    }

    /// Rotate a vector: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(v.x, v.y, v.z, 0.0);
        let r = self * p * self.conjugate();
        Vec3::new(r.x, r.y, r.z)
    }

    /// Component-wise comparison within `tol`.
    pub fn approx_eq(self, other: Self, tol: f64) -> bool {
        (self.x - other.x).abs() <= tol
            && (self.y - other.y).abs() <= tol
            && (self.z - other.z).abs() <= tol
            && (self.w - other.w).abs() <= tol
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Hamilton product: `a * b` applies `b` first, then `a`.
impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

impl From<[f64; 4]> for Quaternion {
    /// `[x, y, z, w]`
    fn from([x, y, z, w]: [f64; 4]) -> Self {
        Self::new(x, y, z, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    const TOL: f64 = 1e-12;

    #[test]
    fn identity_rotate_is_noop() {
        let r = Quaternion::identity().rotate(Vec3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < TOL);
        assert!((r.y - 2.0).abs() < TOL);
        assert!((r.z - 3.0).abs() < TOL);
    }

    #[test]
    fn yaw_90_rotates_x_to_y() {
        let q = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        assert!(q.approx_eq(Quaternion::new(0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2), TOL));

        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < TOL, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < TOL, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < TOL);
    }

    #[test]
    fn roll_and_pitch_match_single_axis_rotations() {
        let roll = Quaternion::from_rpy(FRAC_PI_2, 0.0, 0.0);
        assert!(roll.approx_eq(Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2), TOL));

        let pitch = Quaternion::from_rpy(0.0, FRAC_PI_2, 0.0);
        assert!(pitch.approx_eq(Quaternion::new(0.0, FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2), TOL));
    }

    #[test]
    fn rpy_composes_yaw_after_pitch_after_roll() {
        let (r, p, y) = (0.3, -0.7, 1.1);
        let composed = Quaternion::from_rpy(0.0, 0.0, y)
            * Quaternion::from_rpy(0.0, p, 0.0)
            * Quaternion::from_rpy(r, 0.0, 0.0);
        assert!(Quaternion::from_rpy(r, p, y).approx_eq(composed, TOL));
    }

    #[test]
    fn inverse_of_unit_is_conjugate() {
        let q = Quaternion::from_rpy(0.2, 0.4, -0.9);
        assert!(q.inverse().approx_eq(q.conjugate(), TOL));
        assert!((q * q.inverse()).approx_eq(Quaternion::identity(), TOL));
    }

    #[test]
    fn inverse_of_scaled_quaternion_still_inverts() {
        let q = Quaternion::new(0.0, 0.0, 2.0, 2.0);
        assert!((q * q.inverse()).approx_eq(Quaternion::identity(), TOL));
    }

    #[test]
    fn normalize_scales_to_unit() {
        let q = Quaternion::new(1.0, 2.0, 3.0, 4.0).normalize();
        assert!((q.norm() - 1.0).abs() < TOL);
    }

    #[test]
    fn normalize_zero_is_identity() {
        assert_eq!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize(), Quaternion::identity());
    }

    #[test]
    fn vec3_from_array_and_neg() {
        let v = Vec3::from([1.0, -2.0, 3.0]);
        assert_eq!(-v, Vec3::new(-1.0, 2.0, -3.0));
        assert!((Vec3::new(3.0, 4.0, 0.0).norm() - 5.0).abs() < TOL);
    }
}
