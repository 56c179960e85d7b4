//! Scene builders shared by the benchmarks.

use glam::{Mat3, Quat, Vec3};
use rein_physics::collision::BroadphaseProxy;
use rein_physics::dynamics::{Equation, SolverBody, Spook};
use rein_physics::{
    Aabb, BroadphaseKind, Collider, CollisionFilter, RigidBody, Shape, World, WorldConfig,
};

pub const DT: f32 = 1.0 / 60.0;

/// Deterministic xorshift so runs are comparable.
pub struct Rng(u32);

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    pub fn next_f32(&mut self) -> f32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        (self.0 >> 8) as f32 / (1u32 << 24) as f32
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

fn proxy(center: Vec3, half: Vec3) -> BroadphaseProxy {
    BroadphaseProxy {
        aabb: Aabb::from_center_half_extents(center, half),
        dynamic: true,
        active: true,
        filter: CollisionFilter::default(),
    }
}

/// `n` unit spheres packed in a cube, roughly a third of them overlapping a neighbour.
pub fn setup_sphere_proxies(n: usize) -> Vec<BroadphaseProxy> {
    let side = (n as f32).cbrt().ceil() as usize;
    let spacing = 1.9;
    (0..n)
        .map(|i| {
            let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
            let center = Vec3::new(x as f32, y as f32, z as f32) * spacing;
            proxy(center, Vec3::ONE)
        })
        .collect()
}

/// `n` boxes and spheres of varied size scattered through a volume ten times their count.
pub fn setup_sparse_proxies(n: usize) -> Vec<BroadphaseProxy> {
    let mut rng = Rng::new(0x5eed);
    let extent = (n as f32 * 10.0).cbrt() * 2.0;
    (0..n)
        .map(|_| {
            let center = Vec3::new(
                rng.range(-extent, extent),
                rng.range(-extent, extent),
                rng.range(-extent, extent),
            );
            let half = Vec3::new(rng.range(0.2, 1.5), rng.range(0.2, 1.5), rng.range(0.2, 1.5));
            proxy(center, half)
        })
        .collect()
}

/// A plane with `n` alternating spheres and boxes dropped in columns above it.
pub fn setup_scene(n: usize, broadphase: BroadphaseKind) -> anyhow::Result<World> {
    let mut world = World::new(WorldConfig {
        broadphase,
        ..Default::default()
    })?;
    world.add_body(RigidBody::new_static(), Collider::new(Shape::Plane))?;

    let side = (n as f32).sqrt().ceil() as usize;
    let mut rng = Rng::new(42);
    for i in 0..n {
        let x = (i % side) as f32 * 1.5 - side as f32 * 0.75;
        let z = ((i / side) % side) as f32 * 1.5 - side as f32 * 0.75;
        let y = 0.5 + rng.range(0.0, 4.0);
        let shape = if i % 2 == 0 {
            Shape::sphere(0.5)?
        } else {
            Shape::cuboid(Vec3::splat(0.45))?
        };
        let rotation = Quat::from_rotation_y(rng.range(0.0, std::f32::consts::PI));
        world.add_body(
            RigidBody::new_dynamic(1.0)
                .with_position(Vec3::new(x, y, z))
                .with_rotation(rotation),
            Collider::new(shape),
        )?;
    }
    Ok(world)
}

/// Runs a fresh scene until the pile has settled into resting contact.
pub fn setup_settled_scene(n: usize) -> anyhow::Result<World> {
    let mut world = setup_scene(n, BroadphaseKind::default())?;
    for _ in 0..120 {
        world.step();
    }
    Ok(world)
}

/// `n` unit boxes resting on a static ground body, four contact rows each.
pub fn setup_contacts(n: usize) -> (Vec<SolverBody>, Vec<Equation>) {
    let spook = Spook::new(1e7, 3.0, DT);
    let mut bodies = vec![SolverBody::new(Vec3::ZERO, 0.0, Mat3::ZERO)];
    let mut equations = Vec::with_capacity(n * 4);

    for i in 0..n {
        let center = Vec3::new(i as f32 * 2.0, 0.49, 0.0);
        let mut body = SolverBody::new(center, 1.0, Mat3::from_diagonal(Vec3::splat(6.0)))
            .with_velocity(Vec3::new(0.0, -0.2, 0.0), Vec3::ZERO);
        body.force = Vec3::new(0.0, -9.81, 0.0);
        bodies.push(body);

        for corner in [
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, 0.5),
            Vec3::new(-0.5, -0.5, 0.5),
        ] {
            let point = center + corner;
            equations.push(Equation::contact(
                0,
                i + 1,
                point,
                point - center,
                Vec3::Y,
                0.01,
                0.0,
                spook,
            ));
        }
    }
    (bodies, equations)
}
