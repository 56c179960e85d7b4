//! Rein Physics
//!
//! A rigid body physics engine: broadphase pair finding, SAT contact
//! generation with polygon clipping, and a projected Gauss-Seidel solver over
//! SPOOK-regularized constraint equations.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **math** - Rigid poses and inertia helpers on top of glam
//! 2. **shape** - Collision shapes (sphere, box, convex hull, plane, heightfield, particle, ellipsoid, compound)
//! 3. **collision** - Broadphase, separating axis search, contact generation, collision matrix, ray queries
//! 4. **dynamics** - Bodies, materials, constraint equations, joints, solvers
//! 5. **world** - Body registry and the fixed-step simulation pipeline
//!
//! # Example
//!
//! ```
//! use rein_physics::{Collider, RigidBody, Shape, World, WorldConfig};
//! use rein_physics::glam::Vec3;
//!
//! let mut world = World::new(WorldConfig::default()).unwrap();
//! world
//!     .add_body(RigidBody::new_static(), Collider::new(Shape::Plane))
//!     .unwrap();
//! let ball = world
//!     .add_body(
//!         RigidBody::new_dynamic(1.0).with_position(Vec3::new(0.0, 2.0, 0.0)),
//!         Collider::new(Shape::sphere(0.5).unwrap()),
//!     )
//!     .unwrap();
//!
//! for _ in 0..120 {
//!     world.step();
//! }
//! assert!(world.body(ball).unwrap().position.y > 0.4);
//! ```

pub mod collision;
pub mod dynamics;
pub mod error;
pub mod math;
pub mod shape;
pub mod world;

// Re-export commonly used types
pub use collision::{
    BroadphaseKind, CollisionMatrix, ContactGenerator, ContactManifold, ContactPoint, Ray,
    RayIntersection, SapAxis,
};
pub use dynamics::{
    BodyHandle, BodyId, Collider, CollisionFilter, Constraint, ConstraintHandle, ContactMaterial,
    Material, MaterialId, RigidBody, RigidBodyType, SolverKind,
};
pub use error::{GeometryError, PhysicsError, ShapeError};
pub use math::Pose;
pub use shape::{Aabb, CompoundChild, ConvexPolyhedron, Heightfield, Shape, ShapeKind};
pub use world::{CollisionEvent, CollisionEventKind, RayHit, StepStats, World, WorldConfig};

// Re-export glam for convenience
pub use glam;
