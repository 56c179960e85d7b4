use glam::Vec3;

use super::{Equation, EquationKind, Jacobian, Spook};

impl Equation {
    /// Keeps world axes `axis_a` (on A) and `axis_b` (on B) perpendicular.
    ///
    /// `g = axis_a . axis_b`, `J = [0, axis_a x axis_b, 0, axis_b x axis_a]`.
    pub fn rotational(
        body_a: usize,
        body_b: usize,
        axis_a: Vec3,
        axis_b: Vec3,
        max_impulse: f32,
        spook: Spook,
    ) -> Self {
        Self::new(
            EquationKind::Rotational,
            body_a,
            body_b,
            Jacobian::angular(axis_a.cross(axis_b), axis_b.cross(axis_a)),
            axis_a.dot(axis_b),
            (-max_impulse, max_impulse),
            spook,
        )
    }

    /// Drives `w_b . axis_b - w_a . axis_a` toward `target_velocity`.
    pub fn rotational_motor(
        body_a: usize,
        body_b: usize,
        axis_a: Vec3,
        axis_b: Vec3,
        target_velocity: f32,
        max_impulse: f32,
        spook: Spook,
    ) -> Self {
        Self::new(
            EquationKind::RotationalMotor { target_velocity },
            body_a,
            body_b,
            Jacobian::angular(-axis_a, axis_b),
            0.0,
            (-max_impulse, max_impulse),
            spook,
        )
    }
}
