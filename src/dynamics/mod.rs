//! Bodies, materials, constraint equations, and the solvers that resolve them.

pub mod body;
pub mod constraint;
pub mod equation;
pub mod material;
pub mod solver;

pub use body::{
    BodyHandle, BodyId, Collider, ColliderPart, CollisionFilter, RigidBody, RigidBodyType,
    SleepInfo, SleepState,
};
pub use constraint::{Constraint, ConstraintHandle, HingeMotor, Joint};
pub use equation::{Equation, EquationKind, Jacobian, Spook};
pub use material::{ContactMaterial, Material, MaterialId, MaterialTable};
pub use solver::{GsSolver, SolveStats, Solver, SolverBody, SolverKind, SplitSolver};
