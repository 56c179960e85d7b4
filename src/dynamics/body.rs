//! Rigid body and collider components, and the integration passes over them.

use std::sync::Arc;

use glam::{Mat3, Quat, Vec3};

use super::material::MaterialId;
use crate::math::{integrate_rotation, safe_recip, world_inverse_inertia, Pose};
use crate::shape::{Aabb, Shape};

/// Stable handle of a body registered with a world.
pub type BodyHandle = hecs::Entity;

/// Monotonically increasing identifier assigned at registration; orders bodies
/// in every per-step array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub u64);

/// Rigid body type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigidBodyType {
    /// Affected by forces and collisions.
    Dynamic,
    /// Immovable.
    Static,
    /// Moved by its velocity only, but pushes dynamic bodies.
    Kinematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SleepState {
    #[default]
    Awake,
    Sleeping,
}

/// Sleep bookkeeping, spawned next to every [`RigidBody`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepInfo {
    pub state: SleepState,
    /// Seconds spent below the sleep speed limit.
    pub timer: f32,
}

impl SleepInfo {
    pub fn is_sleeping(&self) -> bool {
        self.state == SleepState::Sleeping
    }
}

/// Group/mask bits. Two bodies may collide only if each one's group is in the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionFilter {
    pub group: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            group: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionFilter {
    pub fn new(group: u32, mask: u32) -> Self {
        Self { group, mask }
    }

    #[inline]
    pub fn allows(&self, other: &CollisionFilter) -> bool {
        (self.group & other.mask) != 0 && (other.group & self.mask) != 0
    }
}

/// Rigid body component.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub body_type: RigidBodyType,
    pub(crate) id: BodyId,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    pub(crate) inertia: Vec3,
    pub(crate) inv_inertia: Vec3,
    pub(crate) inv_inertia_world: Mat3,
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force_accumulator: Vec3,
    pub torque_accumulator: Vec3,
    /// Fraction of linear velocity lost per second (default: 0.01).
    pub linear_damping: f32,
    /// Fraction of angular velocity lost per second (default: 0.01).
    pub angular_damping: f32,
    /// Gravity scale (default: 1.0).
    pub gravity_scale: f32,
    pub material: Option<MaterialId>,
    pub filter: CollisionFilter,
    /// Per-body opt-out from sleeping when the world allows it.
    pub allow_sleep: bool,
}

impl RigidBody {
    /// Create a new dynamic rigid body with the given mass.
    ///
    /// Inertia is derived from the collider when the body is added to a world.
    pub fn new_dynamic(mass: f32) -> Self {
        Self {
            body_type: RigidBodyType::Dynamic,
            mass,
            inv_mass: if mass > 0.0 && mass.is_finite() { 1.0 / mass } else { 0.0 },
            linear_damping: 0.01,
            angular_damping: 0.01,
            gravity_scale: 1.0,
            ..Self::immovable(RigidBodyType::Dynamic)
        }
    }

    /// Create a new static rigid body.
    pub fn new_static() -> Self {
        Self::immovable(RigidBodyType::Static)
    }

    /// Create a new kinematic rigid body.
    pub fn new_kinematic() -> Self {
        Self::immovable(RigidBodyType::Kinematic)
    }

    fn immovable(body_type: RigidBodyType) -> Self {
        Self {
            body_type,
            id: BodyId(0),
            mass: 0.0,
            inv_mass: 0.0,
            inertia: Vec3::ZERO,
            inv_inertia: Vec3::ZERO,
            inv_inertia_world: Mat3::ZERO,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 0.0,
            material: None,
            filter: CollisionFilter::default(),
            allow_sleep: true,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inertia(&self) -> Vec3 {
        self.inertia
    }

    pub fn inv_inertia(&self) -> Vec3 {
        self.inv_inertia
    }

    pub fn inv_inertia_world(&self) -> Mat3 {
        self.inv_inertia_world
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == RigidBodyType::Dynamic
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Velocity of a world-space point rigidly attached to the body.
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Accumulate a force applied at a world-space point.
    pub fn apply_force(&mut self, force: Vec3, point: Vec3) {
        self.force_accumulator += force;
        self.torque_accumulator += (point - self.position).cross(force);
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque_accumulator += torque;
    }

    /// Instantly change velocity by an impulse applied at a world-space point.
    pub fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity +=
            self.inv_inertia_world * (point - self.position).cross(impulse);
    }

    /// Derive inertia from the collider; immovable bodies keep zero inverses.
    pub(crate) fn update_mass_properties(&mut self, collider: &Collider) {
        if self.is_dynamic() {
            self.inv_mass = 1.0 / self.mass;
            self.inertia = collider.local_inertia(self.mass);
            self.inv_inertia = safe_recip(self.inertia);
        } else {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = Vec3::ZERO;
            self.inv_inertia = Vec3::ZERO;
        }
        self.update_world_inertia();
    }

    pub(crate) fn update_world_inertia(&mut self) {
        self.inv_inertia_world = world_inverse_inertia(self.rotation, self.inv_inertia);
    }
}

/// One shape of a collider, posed relative to the body origin.
#[derive(Debug, Clone)]
pub struct ColliderPart {
    pub shape: Arc<Shape>,
    pub offset: Vec3,
    pub orientation: Quat,
}

impl ColliderPart {
    pub fn local_pose(&self) -> Pose {
        Pose::new(self.offset, self.orientation)
    }
}

/// Collision detection component.
#[derive(Debug, Clone, Default)]
pub struct Collider {
    pub parts: Vec<ColliderPart>,
    /// If true, generates collision events but no physics response.
    pub is_sensor: bool,
}

impl Collider {
    /// Collider with a single shape at the body origin.
    pub fn new(shape: Shape) -> Self {
        Self::default().with_part(shape, Vec3::ZERO, Quat::IDENTITY)
    }

    pub fn with_part(mut self, shape: impl Into<Arc<Shape>>, offset: Vec3, orientation: Quat) -> Self {
        self.parts.push(ColliderPart {
            shape: shape.into(),
            offset,
            orientation,
        });
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    /// Inertia of all parts about the body origin, mass split by part volume.
    pub fn local_inertia(&self, mass: f32) -> Vec3 {
        match self.parts.as_slice() {
            [] => Vec3::ZERO,
            [part] if part.offset == Vec3::ZERO && part.orientation == Quat::IDENTITY => {
                part.shape.local_inertia(mass)
            }
            parts => {
                let children: Vec<_> = parts
                    .iter()
                    .map(|p| crate::shape::CompoundChild {
                        shape: p.shape.clone(),
                        pose: p.local_pose(),
                    })
                    .collect();
                Shape::Compound(children).local_inertia(mass)
            }
        }
    }

    pub fn aabb(&self, pose: &Pose) -> Aabb {
        self.parts.iter().fold(Aabb::EMPTY, |acc, part| {
            acc.union(&part.shape.aabb(&pose.compose(&part.local_pose())))
        })
    }
}

/// Apply gravity force to all awake dynamic rigid bodies.
pub fn apply_gravity(world: &mut hecs::World, gravity: Vec3) {
    for (_, (rb, sleep)) in world.query_mut::<(&mut RigidBody, Option<&SleepInfo>)>() {
        let is_sleeping = sleep.is_some_and(SleepInfo::is_sleeping);
        if rb.is_dynamic() && !is_sleeping {
            rb.force_accumulator += gravity * rb.mass * rb.gravity_scale;
        }
    }
}

/// Refresh world inverse inertia from the current orientation.
pub fn update_world_inertia(world: &mut hecs::World) {
    for (_, rb) in world.query_mut::<&mut RigidBody>() {
        if rb.is_dynamic() {
            rb.update_world_inertia();
        }
    }
}

/// Semi-implicit Euler: velocities from accumulated forces, then poses from velocities.
pub fn integrate(world: &mut hecs::World, dt: f32) {
    for (_, (rb, sleep)) in world.query_mut::<(&mut RigidBody, Option<&SleepInfo>)>() {
        let is_sleeping = sleep.is_some_and(SleepInfo::is_sleeping);
        match rb.body_type {
            RigidBodyType::Static => continue,
            RigidBodyType::Dynamic if is_sleeping => continue,
            RigidBodyType::Dynamic => {
                rb.linear_velocity += rb.force_accumulator * rb.inv_mass * dt;
                rb.angular_velocity += rb.inv_inertia_world * rb.torque_accumulator * dt;

                rb.linear_velocity *= (1.0 - rb.linear_damping).clamp(0.0, 1.0).powf(dt);
                rb.angular_velocity *= (1.0 - rb.angular_damping).clamp(0.0, 1.0).powf(dt);
            }
            RigidBodyType::Kinematic => {}
        }

        rb.position += rb.linear_velocity * dt;
        rb.rotation = integrate_rotation(rb.rotation, rb.angular_velocity, dt);
    }
}

/// Clear force and torque accumulators on all rigid bodies.
pub fn clear_forces(world: &mut hecs::World) {
    for (_, rb) in world.query_mut::<&mut RigidBody>() {
        rb.force_accumulator = Vec3::ZERO;
        rb.torque_accumulator = Vec3::ZERO;
    }
}

/// Put slow dynamic bodies to sleep after `time_limit` seconds below `speed_limit`.
pub fn update_sleep_states(world: &mut hecs::World, dt: f32, speed_limit: f32, time_limit: f32) {
    let limit_sq = speed_limit * speed_limit;
    for (_, (rb, sleep)) in world.query_mut::<(&mut RigidBody, &mut SleepInfo)>() {
        if !rb.is_dynamic() || !rb.allow_sleep || sleep.is_sleeping() {
            continue;
        }

        let speed_sq = rb.linear_velocity.length_squared() + rb.angular_velocity.length_squared();
        if speed_sq < limit_sq {
            sleep.timer += dt;
            if sleep.timer >= time_limit {
                sleep.state = SleepState::Sleeping;
                rb.linear_velocity = Vec3::ZERO;
                rb.angular_velocity = Vec3::ZERO;
                tracing::debug!(body = rb.id.0, "body fell asleep");
            }
        } else {
            sleep.timer = 0.0;
        }
    }
}

/// Wake up a specific body. Returns true if it was asleep.
pub fn wake_body(world: &mut hecs::World, entity: BodyHandle) -> bool {
    if let Ok(mut sleep) = world.get::<&mut SleepInfo>(entity) {
        if sleep.is_sleeping() {
            sleep.state = SleepState::Awake;
            sleep.timer = 0.0;
            return true;
        }
        sleep.timer = 0.0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic_sphere(world: &mut hecs::World, position: Vec3) -> hecs::Entity {
        let collider = Collider::new(Shape::sphere(0.5).unwrap());
        let mut rb = RigidBody::new_dynamic(1.0).with_position(position);
        rb.update_mass_properties(&collider);
        world.spawn((rb, collider, SleepInfo::default()))
    }

    fn step(world: &mut hecs::World, gravity: Vec3, dt: f32) {
        apply_gravity(world, gravity);
        update_world_inertia(world);
        integrate(world, dt);
        clear_forces(world);
    }

    #[test]
    fn test_free_fall() {
        let mut world = hecs::World::new();
        let entity = dynamic_sphere(&mut world, Vec3::new(0.0, 10.0, 0.0));

        let gravity = Vec3::new(0.0, -9.81, 0.0);
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            step(&mut world, gravity, dt);
        }

        let rb = world.get::<&RigidBody>(entity).unwrap();
        // Semi-implicit Euler lands a bit below the analytic 5.095
        assert!(
            rb.position.y < 5.1 && rb.position.y > 4.9,
            "Body should have fallen about 4.9m: y = {}",
            rb.position.y
        );
        let eps = 1e-5;
        assert!(rb.position.x.abs() < eps);
        assert!(rb.position.z.abs() < eps);
    }

    #[test]
    fn test_static_body_unaffected() {
        let mut world = hecs::World::new();
        let entity = world.spawn((RigidBody::new_static(), Collider::default(), SleepInfo::default()));

        for _ in 0..60 {
            step(&mut world, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
        }

        let rb = world.get::<&RigidBody>(entity).unwrap();
        assert_eq!(rb.position, Vec3::ZERO);
        assert_eq!(rb.inv_mass(), 0.0);
    }

    #[test]
    fn test_kinematic_moves_by_velocity_only() {
        let mut world = hecs::World::new();
        let entity = world.spawn((
            RigidBody::new_kinematic().with_linear_velocity(Vec3::X),
            Collider::default(),
        ));

        for _ in 0..60 {
            step(&mut world, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
        }

        let rb = world.get::<&RigidBody>(entity).unwrap();
        assert!((rb.position - Vec3::X).length() < 1e-4);
    }

    #[test]
    fn test_clear_forces() {
        let mut world = hecs::World::new();
        let entity = world.spawn((
            {
                let mut rb = RigidBody::new_dynamic(1.0);
                rb.force_accumulator = Vec3::new(10.0, 20.0, 30.0);
                rb.torque_accumulator = Vec3::new(1.0, 2.0, 3.0);
                rb
            },
            Collider::default(),
        ));

        clear_forces(&mut world);

        let rb = world.get::<&RigidBody>(entity).unwrap();
        assert_eq!(rb.force_accumulator, Vec3::ZERO);
        assert_eq!(rb.torque_accumulator, Vec3::ZERO);
    }

    #[test]
    fn test_apply_force_off_center_adds_torque() {
        let mut rb = RigidBody::new_dynamic(1.0);
        rb.apply_force(Vec3::Y, Vec3::X);
        assert_eq!(rb.force_accumulator, Vec3::Y);
        assert!((rb.torque_accumulator - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_mass_properties_from_collider() {
        let collider = Collider::new(Shape::cuboid(Vec3::splat(0.5)).unwrap());
        let mut rb = RigidBody::new_dynamic(6.0);
        rb.update_mass_properties(&collider);
        assert!((rb.inertia() - Vec3::ONE).length() < 1e-5);
        assert!((rb.inv_inertia_world() * Vec3::X - Vec3::X).length() < 1e-5);

        let mut ground = RigidBody::new_static();
        ground.update_mass_properties(&collider);
        assert_eq!(ground.inv_inertia(), Vec3::ZERO);
        assert_eq!(ground.inv_inertia_world(), Mat3::ZERO);
    }

    #[test]
    fn test_sleep_after_time_limit() {
        let mut world = hecs::World::new();
        let entity = dynamic_sphere(&mut world, Vec3::ZERO);
        let dt = 0.25;

        for _ in 0..3 {
            update_sleep_states(&mut world, dt, 0.1, 1.0);
        }
        assert!(!world.get::<&SleepInfo>(entity).unwrap().is_sleeping());

        update_sleep_states(&mut world, dt, 0.1, 1.0);
        assert!(world.get::<&SleepInfo>(entity).unwrap().is_sleeping());

        // sleeping bodies ignore gravity
        step(&mut world, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
        assert_eq!(world.get::<&RigidBody>(entity).unwrap().position, Vec3::ZERO);

        assert!(wake_body(&mut world, entity));
        assert!(!wake_body(&mut world, entity));
    }

    #[test]
    fn test_fast_body_stays_awake() {
        let mut world = hecs::World::new();
        let entity = dynamic_sphere(&mut world, Vec3::ZERO);
        world.get::<&mut RigidBody>(entity).unwrap().linear_velocity = Vec3::X;

        for _ in 0..10 {
            update_sleep_states(&mut world, 0.5, 0.1, 1.0);
        }
        assert!(!world.get::<&SleepInfo>(entity).unwrap().is_sleeping());
    }

    #[test]
    fn test_collision_filter() {
        let a = CollisionFilter::new(0b01, 0b10);
        let b = CollisionFilter::new(0b10, 0b01);
        let c = CollisionFilter::new(0b10, 0b10);
        assert!(a.allows(&b));
        assert!(!a.allows(&c));
        assert!(CollisionFilter::default().allows(&CollisionFilter::default()));
    }
}
