//! Collision detection: broadphase pair finding, SAT, contact generation, and
//! the per-pair bookkeeping that drives begin/end events.

pub mod broadphase;
pub mod contact;
pub mod matrix;
pub mod narrowphase;
pub mod ray;
pub mod sat;

pub use broadphase::{
    Broadphase, BroadphaseKind, BroadphaseProxy, GridBroadphase, NaiveBroadphase, SapAxis,
    SweepAndPrune,
};
pub use contact::{ContactCache, ContactManifold, ContactPoint};
pub use matrix::CollisionMatrix;
pub use narrowphase::ContactGenerator;
pub use ray::{Ray, RayIntersection};
pub use sat::{find_separating_axis, SeparatingAxis};
