//! Projected Gauss-Seidel solver over SPOOK equations, plus an island-splitting variant.

use glam::{Mat3, Quat, Vec3};

use super::body::{RigidBody, RigidBodyType, SleepInfo};
use super::equation::{Equation, EquationKind};

/// `J M^-1 J^T` at or below which an equation is skipped. The SPOOK `eps`
/// term is left out so rows between immovable bodies are caught.
const MIN_EFFECTIVE_MASS: f32 = 1e-12;

/// Per-step snapshot of a body as seen by the solver.
///
/// Static, kinematic, and sleeping bodies carry zero inverse mass and inertia.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub inv_mass: f32,
    pub inv_inertia: Mat3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub torque: Vec3,
    /// Velocity change accumulated during the solve.
    pub delta_linear: Vec3,
    pub delta_angular: Vec3,
}

impl SolverBody {
    pub fn new(position: Vec3, inv_mass: f32, inv_inertia: Mat3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            inv_mass,
            inv_inertia,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            delta_linear: Vec3::ZERO,
            delta_angular: Vec3::ZERO,
        }
    }

    pub fn from_body(rb: &RigidBody, sleep: Option<&SleepInfo>) -> Self {
        let movable = rb.body_type == RigidBodyType::Dynamic
            && !sleep.is_some_and(SleepInfo::is_sleeping);
        Self {
            position: rb.position,
            rotation: rb.rotation,
            inv_mass: if movable { rb.inv_mass() } else { 0.0 },
            inv_inertia: if movable {
                rb.inv_inertia_world()
            } else {
                Mat3::ZERO
            },
            linear_velocity: rb.linear_velocity,
            angular_velocity: rb.angular_velocity,
            force: rb.force_accumulator,
            torque: rb.torque_accumulator,
            delta_linear: Vec3::ZERO,
            delta_angular: Vec3::ZERO,
        }
    }

    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Whether impulses can move this body; only these join islands.
    #[inline]
    pub fn is_movable(&self) -> bool {
        self.inv_mass > 0.0
    }

    /// Velocities after the solve.
    pub fn solved_velocity(&self) -> (Vec3, Vec3) {
        (
            self.linear_velocity + self.delta_linear,
            self.angular_velocity + self.delta_angular,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolveStats {
    /// Iterations used; for the split solver, the largest island's count.
    pub iterations: usize,
    pub islands: usize,
}

pub trait Solver: Send {
    /// Solve `equations` for one step, writing velocity changes into `bodies`.
    fn solve(&mut self, dt: f32, bodies: &mut [SolverBody], equations: &mut [Equation]) -> SolveStats;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    GaussSeidel,
    Split,
}

impl SolverKind {
    pub fn build(self, iterations: usize, tolerance: f32, warm_starting: bool) -> Box<dyn Solver> {
        let gs = GsSolver::new(iterations, tolerance, warm_starting);
        match self {
            SolverKind::GaussSeidel => Box::new(gs),
            SolverKind::Split => Box::new(SplitSolver::new(gs)),
        }
    }
}

/// Projected Gauss-Seidel with early exit on `(sum |dlambda|)^2 < tolerance^2`.
#[derive(Debug, Clone)]
pub struct GsSolver {
    pub iterations: usize,
    pub tolerance: f32,
    pub warm_starting: bool,
    order: Vec<usize>,
}

impl GsSolver {
    pub fn new(iterations: usize, tolerance: f32, warm_starting: bool) -> Self {
        Self {
            iterations,
            tolerance,
            warm_starting,
            order: Vec::new(),
        }
    }

    /// Solve only the equations listed in `subset`, visiting them in that order.
    ///
    /// Friction rows still refer to their contact row by global index.
    pub fn solve_subset(
        &self,
        dt: f32,
        bodies: &mut [SolverBody],
        equations: &mut [Equation],
        subset: &[usize],
    ) -> usize {
        if subset.is_empty() {
            return 0;
        }

        for &i in subset {
            let eq = &mut equations[i];
            eq.rhs = eq.compute_rhs(bodies, dt);
            let jmj = eq.jacobian.effective_mass(&bodies[eq.body_a], &bodies[eq.body_b]);
            if jmj > MIN_EFFECTIVE_MASS {
                eq.inv_effective_mass = 1.0 / (jmj + eq.spook.eps);
            } else {
                eq.inv_effective_mass = 0.0;
                eq.impulse = 0.0;
            }
            if !self.warm_starting {
                eq.impulse = 0.0;
            }
        }

        if self.warm_starting {
            for &i in subset {
                let eq = &equations[i];
                if eq.impulse != 0.0 && eq.inv_effective_mass > 0.0 {
                    apply_impulse(bodies, eq, eq.impulse);
                }
            }
        }

        let tolerance_sq = self.tolerance * self.tolerance;
        let mut used = 0;
        for _ in 0..self.iterations {
            used += 1;
            let mut delta_total = 0.0f32;

            for &i in subset {
                if let EquationKind::Friction {
                    contact,
                    coefficient,
                } = equations[i].kind
                {
                    let limit = coefficient * equations[contact].impulse.max(0.0);
                    equations[i].min_impulse = -limit;
                    equations[i].max_impulse = limit;
                }

                let eq = &mut equations[i];
                if eq.inv_effective_mass == 0.0 {
                    continue;
                }

                let gw_lambda = eq
                    .jacobian
                    .delta_velocity(&bodies[eq.body_a], &bodies[eq.body_b]);
                let delta = eq.inv_effective_mass * (eq.rhs - gw_lambda - eq.spook.eps * eq.impulse);
                let accumulated = (eq.impulse + delta).clamp(eq.min_impulse, eq.max_impulse);
                let delta = accumulated - eq.impulse;
                eq.impulse = accumulated;

                delta_total += delta.abs();
                apply_impulse(bodies, eq, delta);
            }

            if delta_total * delta_total < tolerance_sq {
                break;
            }
        }
        used
    }
}

impl Solver for GsSolver {
    fn solve(&mut self, dt: f32, bodies: &mut [SolverBody], equations: &mut [Equation]) -> SolveStats {
        let mut order = std::mem::take(&mut self.order);
        order.clear();
        order.extend(0..equations.len());
        let iterations = self.solve_subset(dt, bodies, equations, &order);
        self.order = order;
        SolveStats {
            iterations,
            islands: usize::from(!equations.is_empty()),
        }
    }
}

/// Splits equations into islands of connected movable bodies and solves each separately.
#[derive(Debug, Clone)]
pub struct SplitSolver {
    inner: GsSolver,
    parent: Vec<usize>,
    island_of_root: Vec<Option<usize>>,
    islands: Vec<Vec<usize>>,
}

impl SplitSolver {
    pub fn new(inner: GsSolver) -> Self {
        Self {
            inner,
            parent: Vec::new(),
            island_of_root: Vec::new(),
            islands: Vec::new(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // smaller root wins so island order follows body order
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }

    /// Equation index lists, one per island, in order of first appearance.
    pub fn build_islands(&mut self, bodies: &[SolverBody], equations: &[Equation]) -> &[Vec<usize>] {
        self.parent.clear();
        self.parent.extend(0..bodies.len());
        for eq in equations {
            if bodies[eq.body_a].is_movable() && bodies[eq.body_b].is_movable() {
                self.union(eq.body_a, eq.body_b);
            }
        }

        self.island_of_root.clear();
        self.island_of_root.resize(bodies.len(), None);
        for island in &mut self.islands {
            island.clear();
        }
        let mut count = 0;

        for (index, eq) in equations.iter().enumerate() {
            let anchor = if bodies[eq.body_a].is_movable() {
                eq.body_a
            } else if bodies[eq.body_b].is_movable() {
                eq.body_b
            } else {
                continue;
            };
            let root = self.find(anchor);
            let island = match self.island_of_root[root] {
                Some(island) => island,
                None => {
                    self.island_of_root[root] = Some(count);
                    if self.islands.len() <= count {
                        self.islands.push(Vec::new());
                    }
                    count += 1;
                    count - 1
                }
            };
            self.islands[island].push(index);
        }

        &self.islands[..count]
    }
}

impl Solver for SplitSolver {
    fn solve(&mut self, dt: f32, bodies: &mut [SolverBody], equations: &mut [Equation]) -> SolveStats {
        let count = self.build_islands(bodies, equations).len();
        let mut stats = SolveStats {
            iterations: 0,
            islands: count,
        };
        for island in &self.islands[..count] {
            let used = self.inner.solve_subset(dt, bodies, equations, island);
            stats.iterations = stats.iterations.max(used);
        }
        stats
    }
}

/// Apply `M^-1 J^T * delta` to both bodies of an equation.
#[inline]
fn apply_impulse(bodies: &mut [SolverBody], eq: &Equation, delta: f32) {
    let j = &eq.jacobian;

    let a = &mut bodies[eq.body_a];
    a.delta_linear += j.linear_a * (a.inv_mass * delta);
    a.delta_angular += a.inv_inertia * j.angular_a * delta;

    let b = &mut bodies[eq.body_b];
    b.delta_linear += j.linear_b * (b.inv_mass * delta);
    b.delta_angular += b.inv_inertia * j.angular_b * delta;
}
