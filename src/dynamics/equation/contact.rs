use glam::Vec3;

use super::{Equation, EquationKind, Jacobian, Spook};

impl Equation {
    /// Non-penetration row along `normal` (pointing from A to B).
    ///
    /// `g = -depth`, impulse in `[0, inf)`.
    #[allow(clippy::too_many_arguments)]
    pub fn contact(
        body_a: usize,
        body_b: usize,
        ra: Vec3,
        rb: Vec3,
        normal: Vec3,
        depth: f32,
        restitution: f32,
        spook: Spook,
    ) -> Self {
        Self::new(
            EquationKind::Contact { restitution },
            body_a,
            body_b,
            Jacobian::point(ra, rb, normal),
            -depth,
            (0.0, f32::INFINITY),
            spook,
        )
    }

    /// Tangential row for the contact equation at index `contact`.
    ///
    /// Bounds are `+-coefficient * lambda_contact`, refreshed by the solver on every visit.
    #[allow(clippy::too_many_arguments)]
    pub fn friction(
        body_a: usize,
        body_b: usize,
        ra: Vec3,
        rb: Vec3,
        tangent: Vec3,
        coefficient: f32,
        contact: usize,
        spook: Spook,
    ) -> Self {
        Self::new(
            EquationKind::Friction {
                contact,
                coefficient,
            },
            body_a,
            body_b,
            Jacobian::point(ra, rb, tangent),
            0.0,
            (0.0, 0.0),
            spook,
        )
    }
}
