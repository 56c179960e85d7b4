//! Joints between two bodies, expanded into equations every step.

use glam::Vec3;

use super::body::BodyHandle;
use super::equation::{Equation, Spook, DEFAULT_RELAXATION, DEFAULT_STIFFNESS};
use super::solver::SolverBody;

/// Handle of a constraint registered with a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeMotor {
    /// Target relative angular speed about the hinge axis, rad/s.
    pub target_velocity: f32,
    pub max_force: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Joint {
    /// Pivots (in each body's local frame) are held at the same world point.
    PointToPoint { pivot_a: Vec3, pivot_b: Vec3 },
    /// Body centers are held `distance` apart.
    Distance { distance: f32 },
    /// Point-to-point plus two rotational rows keeping the local axes aligned.
    Hinge {
        pivot_a: Vec3,
        pivot_b: Vec3,
        axis_a: Vec3,
        axis_b: Vec3,
        motor: Option<HingeMotor>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub joint: Joint,
    /// Largest force any row may apply.
    pub max_force: f32,
    pub stiffness: f32,
    pub relaxation: f32,
    /// When false, contacts between the two bodies are ignored.
    pub collide_connected: bool,
}

impl Constraint {
    fn new(body_a: BodyHandle, body_b: BodyHandle, joint: Joint) -> Self {
        Self {
            body_a,
            body_b,
            joint,
            max_force: 1e6,
            stiffness: DEFAULT_STIFFNESS,
            relaxation: DEFAULT_RELAXATION,
            collide_connected: true,
        }
    }

    pub fn point_to_point(body_a: BodyHandle, pivot_a: Vec3, body_b: BodyHandle, pivot_b: Vec3) -> Self {
        Self::new(body_a, body_b, Joint::PointToPoint { pivot_a, pivot_b })
    }

    pub fn distance(body_a: BodyHandle, body_b: BodyHandle, distance: f32) -> Self {
        Self::new(body_a, body_b, Joint::Distance { distance })
    }

    pub fn hinge(
        body_a: BodyHandle,
        pivot_a: Vec3,
        axis_a: Vec3,
        body_b: BodyHandle,
        pivot_b: Vec3,
        axis_b: Vec3,
    ) -> Self {
        Self::new(
            body_a,
            body_b,
            Joint::Hinge {
                pivot_a,
                pivot_b,
                axis_a: axis_a.normalize_or_zero(),
                axis_b: axis_b.normalize_or_zero(),
                motor: None,
            },
        )
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    pub fn with_spook(mut self, stiffness: f32, relaxation: f32) -> Self {
        self.stiffness = stiffness;
        self.relaxation = relaxation;
        self
    }

    /// Enable or retarget the motor of a hinge. Returns false for other joints.
    pub fn enable_motor(&mut self, target_velocity: f32, max_force: f32) -> bool {
        match &mut self.joint {
            Joint::Hinge { motor, .. } => {
                *motor = Some(HingeMotor {
                    target_velocity,
                    max_force,
                });
                true
            }
            _ => false,
        }
    }

    pub fn disable_motor(&mut self) {
        if let Joint::Hinge { motor, .. } = &mut self.joint {
            *motor = None;
        }
    }

    /// Check that every parameter is usable by the solver.
    pub(crate) fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("max_force", self.max_force),
            ("stiffness", self.stiffness),
            ("relaxation", self.relaxation),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("constraint {name} must be positive, got {value}"));
            }
        }

        match &self.joint {
            Joint::PointToPoint { pivot_a, pivot_b } => finite_pivots(*pivot_a, *pivot_b),
            Joint::Distance { distance } => {
                if distance.is_finite() && *distance >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("distance must be non-negative, got {distance}"))
                }
            }
            Joint::Hinge {
                pivot_a,
                pivot_b,
                axis_a,
                axis_b,
                motor,
            } => {
                finite_pivots(*pivot_a, *pivot_b)?;
                // zero or non-finite input axes normalize to zero
                for (name, axis) in [("axis_a", axis_a), ("axis_b", axis_b)] {
                    if !axis.is_normalized() {
                        return Err(format!("hinge {name} must be a non-zero finite vector, got {axis}"));
                    }
                }
                if let Some(motor) = motor {
                    if !motor.target_velocity.is_finite() {
                        return Err(format!(
                            "motor target velocity must be finite, got {}",
                            motor.target_velocity
                        ));
                    }
                    if !(motor.max_force.is_finite() && motor.max_force > 0.0) {
                        return Err(format!("motor max_force must be positive, got {}", motor.max_force));
                    }
                }
                Ok(())
            }
        }
    }

    /// Append this joint's rows for bodies at solver indices `ia`/`ib`.
    pub fn build_equations(
        &self,
        ia: usize,
        ib: usize,
        bodies: &[SolverBody],
        dt: f32,
        out: &mut Vec<Equation>,
    ) {
        let spook = Spook::new(self.stiffness, self.relaxation, dt);
        let max_impulse = self.max_force * dt;
        let a = &bodies[ia];
        let b = &bodies[ib];

        match &self.joint {
            Joint::PointToPoint { pivot_a, pivot_b } => {
                point_rows(ia, ib, a, b, *pivot_a, *pivot_b, max_impulse, spook, out);
            }
            Joint::Distance { distance } => {
                let d = b.position - a.position;
                let length = d.length();
                let n = if length > 1e-9 { d / length } else { Vec3::Y };
                out.push(Equation::joint(
                    ia,
                    ib,
                    Vec3::ZERO,
                    Vec3::ZERO,
                    n,
                    length - distance,
                    max_impulse,
                    spook,
                ));
            }
            Joint::Hinge {
                pivot_a,
                pivot_b,
                axis_a,
                axis_b,
                motor,
            } => {
                point_rows(ia, ib, a, b, *pivot_a, *pivot_b, max_impulse, spook, out);

                let world_axis_a = a.rotation * *axis_a;
                let world_axis_b = b.rotation * *axis_b;
                let (t1, t2) = world_axis_a.any_orthonormal_pair();
                out.push(Equation::rotational(ia, ib, t1, world_axis_b, max_impulse, spook));
                out.push(Equation::rotational(ia, ib, t2, world_axis_b, max_impulse, spook));

                if let Some(motor) = motor {
                    out.push(Equation::rotational_motor(
                        ia,
                        ib,
                        world_axis_a,
                        world_axis_b,
                        motor.target_velocity,
                        motor.max_force * dt,
                        spook,
                    ));
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn point_rows(
    ia: usize,
    ib: usize,
    a: &SolverBody,
    b: &SolverBody,
    pivot_a: Vec3,
    pivot_b: Vec3,
    max_impulse: f32,
    spook: Spook,
    out: &mut Vec<Equation>,
) {
    let ra = a.rotation * pivot_a;
    let rb = b.rotation * pivot_b;
    let gap = (b.position + rb) - (a.position + ra);
    for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
        out.push(Equation::joint(ia, ib, ra, rb, axis, gap.dot(axis), max_impulse, spook));
    }
}

fn finite_pivots(pivot_a: Vec3, pivot_b: Vec3) -> Result<(), String> {
    if pivot_a.is_finite() && pivot_b.is_finite() {
        Ok(())
    } else {
        Err(format!("pivots must be finite, got {pivot_a} and {pivot_b}"))
    }
}
