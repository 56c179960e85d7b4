//! Constraint rows consumed by the solver.
//!
//! Every row is regularised with SPOOK: stiffness and relaxation map to the
//! `a`, `b`, `eps` coefficients of the right-hand side
//! `B = -g*a - GW*b - h*GiMf` and effective mass `C = J M^-1 J^T + eps`.

mod contact;
mod rotational;

use glam::Vec3;

use super::solver::SolverBody;

/// Stiffness and relaxation used for joint rows unless overridden.
pub const DEFAULT_STIFFNESS: f32 = 1e7;
pub const DEFAULT_RELAXATION: f32 = 4.0;

/// SPOOK coefficients for one time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spook {
    pub a: f32,
    pub b: f32,
    pub eps: f32,
}

impl Spook {
    pub fn new(stiffness: f32, relaxation: f32, dt: f32) -> Self {
        let d = relaxation;
        let k = stiffness;
        let h = dt;
        Self {
            a: 4.0 / (h * (1.0 + 4.0 * d)),
            b: (4.0 * d) / (1.0 + 4.0 * d),
            eps: 4.0 / (h * h * k * (1.0 + 4.0 * d)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EquationKind {
    /// Non-penetration; `GW` is scaled by `1 + restitution`.
    Contact { restitution: f32 },
    /// Tangential row bounded by `coefficient` times the impulse of equation `contact`.
    Friction { contact: usize, coefficient: f32 },
    Rotational,
    RotationalMotor { target_velocity: f32 },
    /// Bilateral point-to-point or distance row.
    Joint,
}

/// `J = [linear_a, angular_a, linear_b, angular_b]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Jacobian {
    pub linear_a: Vec3,
    pub angular_a: Vec3,
    pub linear_b: Vec3,
    pub angular_b: Vec3,
}

impl Jacobian {
    /// Row for a direction `n` acting at offsets `ra` (on A) and `rb` (on B):
    /// `[-n, -(ra x n), n, rb x n]`.
    pub fn point(ra: Vec3, rb: Vec3, n: Vec3) -> Self {
        Self {
            linear_a: -n,
            angular_a: -ra.cross(n),
            linear_b: n,
            angular_b: rb.cross(n),
        }
    }

    /// Pure rotation row `[0, angular_a, 0, angular_b]`.
    pub fn angular(angular_a: Vec3, angular_b: Vec3) -> Self {
        Self {
            angular_a,
            angular_b,
            ..Default::default()
        }
    }

    /// `J . v` using the bodies' velocities at the start of the solve.
    #[inline]
    pub fn velocity(&self, a: &SolverBody, b: &SolverBody) -> f32 {
        self.linear_a.dot(a.linear_velocity)
            + self.angular_a.dot(a.angular_velocity)
            + self.linear_b.dot(b.linear_velocity)
            + self.angular_b.dot(b.angular_velocity)
    }

    /// `J . dv` using the velocity change accumulated so far in the solve.
    #[inline]
    pub fn delta_velocity(&self, a: &SolverBody, b: &SolverBody) -> f32 {
        self.linear_a.dot(a.delta_linear)
            + self.angular_a.dot(a.delta_angular)
            + self.linear_b.dot(b.delta_linear)
            + self.angular_b.dot(b.delta_angular)
    }

    /// `J M^-1 J^T`.
    #[inline]
    pub fn effective_mass(&self, a: &SolverBody, b: &SolverBody) -> f32 {
        a.inv_mass * self.linear_a.length_squared()
            + self.angular_a.dot(a.inv_inertia * self.angular_a)
            + b.inv_mass * self.linear_b.length_squared()
            + self.angular_b.dot(b.inv_inertia * self.angular_b)
    }

    /// `J M^-1 f` for the external forces and torques.
    #[inline]
    pub fn force_term(&self, a: &SolverBody, b: &SolverBody) -> f32 {
        self.linear_a.dot(a.force * a.inv_mass)
            + self.angular_a.dot(a.inv_inertia * a.torque)
            + self.linear_b.dot(b.force * b.inv_mass)
            + self.angular_b.dot(b.inv_inertia * b.torque)
    }
}

/// One scalar constraint row between two solver bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub kind: EquationKind,
    pub body_a: usize,
    pub body_b: usize,
    pub jacobian: Jacobian,
    pub min_impulse: f32,
    pub max_impulse: f32,
    /// Constraint violation `g`.
    pub violation: f32,
    pub spook: Spook,
    /// Accumulated impulse; seeds the next solve when warm starting.
    pub impulse: f32,
    pub(crate) rhs: f32,
    pub(crate) inv_effective_mass: f32,
}

impl Equation {
    pub fn new(
        kind: EquationKind,
        body_a: usize,
        body_b: usize,
        jacobian: Jacobian,
        violation: f32,
        bounds: (f32, f32),
        spook: Spook,
    ) -> Self {
        Self {
            kind,
            body_a,
            body_b,
            jacobian,
            min_impulse: bounds.0,
            max_impulse: bounds.1,
            violation,
            spook,
            impulse: 0.0,
            rhs: 0.0,
            inv_effective_mass: 0.0,
        }
    }

    /// Bilateral row along `axis` at offsets `ra`/`rb`, used by point and distance joints.
    #[allow(clippy::too_many_arguments)]
    pub fn joint(
        body_a: usize,
        body_b: usize,
        ra: Vec3,
        rb: Vec3,
        axis: Vec3,
        violation: f32,
        max_impulse: f32,
        spook: Spook,
    ) -> Self {
        Self::new(
            EquationKind::Joint,
            body_a,
            body_b,
            Jacobian::point(ra, rb, axis),
            violation,
            (-max_impulse, max_impulse),
            spook,
        )
    }

    pub fn with_impulse(mut self, impulse: f32) -> Self {
        self.impulse = impulse;
        self
    }

    /// Constraint velocity `J . v` at the start of the solve.
    pub fn constraint_velocity(&self, bodies: &[SolverBody]) -> f32 {
        self.jacobian
            .velocity(&bodies[self.body_a], &bodies[self.body_b])
    }

    /// `B = -g*a - GW*b - h*GiMf`.
    pub fn compute_rhs(&self, bodies: &[SolverBody], dt: f32) -> f32 {
        let a = &bodies[self.body_a];
        let b = &bodies[self.body_b];
        let gw = self.jacobian.velocity(a, b);
        let gw = match self.kind {
            EquationKind::Contact { restitution } => (1.0 + restitution) * gw,
            EquationKind::RotationalMotor { target_velocity } => gw - target_velocity,
            _ => gw,
        };
        let gimf = self.jacobian.force_term(a, b);
        -self.violation * self.spook.a - gw * self.spook.b - dt * gimf
    }

    /// `C = J M^-1 J^T + eps`.
    pub fn compute_effective_mass(&self, bodies: &[SolverBody]) -> f32 {
        self.jacobian
            .effective_mass(&bodies[self.body_a], &bodies[self.body_b])
            + self.spook.eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat3;

    #[test]
    fn test_spook_coefficients() {
        let s = Spook::new(1e7, 3.0, 1.0 / 60.0);
        assert!((s.a - 4.0 * 60.0 / 13.0).abs() < 1e-3);
        assert!((s.b - 12.0 / 13.0).abs() < 1e-6);
        assert!(s.eps > 0.0 && s.eps < 1e-3);
    }

    #[test]
    fn test_point_jacobian_matches_relative_velocity() {
        let a = SolverBody::new(Vec3::ZERO, 1.0, Mat3::IDENTITY)
            .with_velocity(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO);
        let b = SolverBody::new(Vec3::new(0.0, 2.0, 0.0), 1.0, Mat3::IDENTITY)
            .with_velocity(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let n = Vec3::Y;
        let ra = Vec3::new(0.0, 1.0, 0.0);
        let rb = Vec3::new(1.0, -1.0, 0.0);
        let j = Jacobian::point(ra, rb, n);

        let va = a.linear_velocity + a.angular_velocity.cross(ra);
        let vb = b.linear_velocity + b.angular_velocity.cross(rb);
        assert!((j.velocity(&a, &b) - (vb - va).dot(n)).abs() < 1e-6);
    }

    #[test]
    fn test_effective_mass_includes_eps() {
        let bodies = [
            SolverBody::new(Vec3::ZERO, 0.0, Mat3::ZERO),
            SolverBody::new(Vec3::ZERO, 0.5, Mat3::ZERO),
        ];
        let spook = Spook::new(1e7, 3.0, 1.0 / 60.0);
        let eq = Equation::joint(0, 1, Vec3::ZERO, Vec3::ZERO, Vec3::X, 0.0, 1.0, spook);
        assert!((eq.compute_effective_mass(&bodies) - (0.5 + spook.eps)).abs() < 1e-7);
    }

    #[test]
    fn test_rhs_of_resting_constraint_is_zero() {
        let bodies = [
            SolverBody::new(Vec3::ZERO, 1.0, Mat3::IDENTITY),
            SolverBody::new(Vec3::X, 1.0, Mat3::IDENTITY),
        ];
        let eq = Equation::joint(
            0,
            1,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::X,
            0.0,
            10.0,
            Spook::new(1e7, 4.0, 0.01),
        );
        assert_eq!(eq.compute_rhs(&bodies, 0.01), 0.0);
        assert_eq!(eq.constraint_velocity(&bodies), 0.0);
    }
}
