//! Rigid transforms and small helpers on top of glam.

use glam::{Mat3, Quat, Vec3};

/// Position and orientation of a body or shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    #[inline]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    #[inline]
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    #[inline]
    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.inverse() * vector
    }

    /// World pose of a child whose pose is given relative to `self`.
    #[inline]
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.transform_point(local.position),
            rotation: (self.rotation * local.rotation).normalize(),
        }
    }
}

/// World-space inverse inertia `R * diag(inv_inertia) * R^T`.
#[inline]
pub fn world_inverse_inertia(rotation: Quat, inv_inertia: Vec3) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * Mat3::from_diagonal(inv_inertia) * r.transpose()
}

/// Component-wise reciprocal, mapping zero (and non-finite results) to zero.
#[inline]
pub fn safe_recip(v: Vec3) -> Vec3 {
    let recip = |x: f32| if x > 0.0 && x.is_finite() { 1.0 / x } else { 0.0 };
    Vec3::new(recip(v.x), recip(v.y), recip(v.z))
}

/// Integrate an orientation by angular velocity: q += 0.5 * dt * (omega, 0) * q.
///
/// The result is always unit length, even when the body is not spinning.
#[inline]
pub fn integrate_rotation(rotation: Quat, angular_velocity: Vec3, dt: f32) -> Quat {
    if angular_velocity.length_squared() < 1e-12 {
        return normalize_rotation(rotation);
    }
    let omega = Quat::from_xyzw(angular_velocity.x, angular_velocity.y, angular_velocity.z, 0.0);
    let q_dot = omega * rotation * 0.5;
    normalize_rotation(Quat::from_xyzw(
        rotation.x + q_dot.x * dt,
        rotation.y + q_dot.y * dt,
        rotation.z + q_dot.z * dt,
        rotation.w + q_dot.w * dt,
    ))
}

/// Unit quaternion, falling back to identity for zero or non-finite input.
#[inline]
pub fn normalize_rotation(rotation: Quat) -> Quat {
    let length_sq = rotation.length_squared();
    if length_sq > 0.0 && length_sq.is_finite() {
        rotation * length_sq.sqrt().recip()
    } else {
        Quat::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_pose_round_trip() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(FRAC_PI_2));
        let p = Vec3::new(0.5, -1.0, 2.0);
        let back = pose.inverse_transform_point(pose.transform_point(p));
        assert!((back - p).length() < 1e-5);
    }

    #[test]
    fn test_pose_compose() {
        let parent = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_y(FRAC_PI_2));
        let child = Pose::from_position(Vec3::X);
        let world = parent.compose(&child);
        // +X rotated 90 degrees about Y points along -Z
        assert!((world.position - Vec3::new(0.0, 1.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_world_inverse_inertia_identity_rotation() {
        let m = world_inverse_inertia(Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0));
        assert!((m * Vec3::X - Vec3::X).length() < 1e-6);
        assert!((m * Vec3::Z - Vec3::Z * 3.0).length() < 1e-6);
    }

    #[test]
    fn test_integrate_rotation_stays_normalized() {
        let mut q = Quat::IDENTITY;
        for _ in 0..600 {
            q = integrate_rotation(q, Vec3::new(0.3, 2.0, -1.0), 1.0 / 60.0);
        }
        assert!((q.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_integrate_rotation_normalizes_at_rest() {
        let stretched = Quat::from_rotation_z(0.7) * 3.0;
        let rested = integrate_rotation(stretched, Vec3::ZERO, 1.0 / 60.0);
        assert!((rested.length() - 1.0).abs() < 1e-6);
        assert!(rested.abs_diff_eq(Quat::from_rotation_z(0.7), 1e-6));

        let tiny_spin = integrate_rotation(Quat::from_xyzw(0.0, 0.0, 0.0, 0.5), Vec3::splat(1e-7), 1.0 / 60.0);
        assert!((tiny_spin.length() - 1.0).abs() < 1e-6);

        assert_eq!(integrate_rotation(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), Vec3::ZERO, 1.0), Quat::IDENTITY);
    }

    #[test]
    fn test_safe_recip() {
        let r = safe_recip(Vec3::new(2.0, 0.0, f32::INFINITY));
        assert_eq!(r, Vec3::new(0.5, 0.0, 0.0));
    }
}
