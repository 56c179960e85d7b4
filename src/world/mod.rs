//! The physics world: body registry and the fixed-step simulation pipeline.
//!
//! # Architecture
//!
//! Each [`World::step`] runs:
//!
//! 1. Apply forces (gravity) and refresh world inertia
//! 2. Broadphase collision detection (AABB overlap)
//! 3. Narrowphase contact generation (closed-form routines, SAT + clipping)
//! 4. Assemble contact, friction, and joint equations
//! 5. Solve (projected Gauss-Seidel, optionally per island)
//! 6. Integrate velocities and poses
//! 7. Fire begin/end collision events
//! 8. Clear force accumulators and update sleep states

mod config;
mod event;

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::Vec3;

use crate::collision::ray::intersect_shape;
use crate::collision::{
    Broadphase, BroadphaseProxy, CollisionMatrix, ContactCache, ContactGenerator, ContactManifold,
    ContactPoint, Ray,
};
use crate::dynamics::body;
use crate::dynamics::{
    BodyHandle, BodyId, Collider, Constraint, ConstraintHandle, ContactMaterial, Equation,
    Material, MaterialId, MaterialTable, RigidBody, RigidBodyType, SleepInfo,
    Solver, SolverBody, Spook,
};
use crate::error::PhysicsError;

pub use config::WorldConfig;
pub use event::{CollisionEvent, CollisionEventKind, CollisionListener};

/// Counters from the most recent step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub broadphase_pairs: usize,
    pub manifolds: usize,
    pub contacts: usize,
    pub equations: usize,
    pub solver_iterations: usize,
    pub islands: usize,
    /// Shape pairs dropped because of degenerate geometry.
    pub degenerate_pairs: usize,
}

/// The body a ray met, and where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub id: BodyId,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Equation rows that belong to one contact point, for writing impulses back.
#[derive(Debug, Clone, Copy)]
struct ContactRow {
    manifold: usize,
    contact: usize,
    equation: usize,
    friction: bool,
}

/// The main physics world managing simulation state.
pub struct World {
    config: WorldConfig,
    bodies: hecs::World,
    ids: BTreeMap<BodyId, BodyHandle>,
    next_body_id: u64,
    constraints: Vec<(ConstraintHandle, Constraint)>,
    next_constraint_id: u64,
    materials: MaterialTable,
    broadphase: Box<dyn Broadphase>,
    generator: ContactGenerator,
    solver: Box<dyn Solver>,
    contact_cache: ContactCache,
    matrix: CollisionMatrix,
    previous_matrix: CollisionMatrix,
    manifolds: Vec<ContactManifold>,
    events: Vec<CollisionEvent>,
    listeners: Vec<CollisionListener>,
    accumulator: f64,
    time: f64,
    step_count: u64,
    stats: StepStats,

    // per-step scratch, indexed by solver index
    handles: Vec<BodyHandle>,
    body_ids: Vec<BodyId>,
    index_of: HashMap<BodyHandle, usize>,
    solver_bodies: Vec<SolverBody>,
    proxies: Vec<BroadphaseProxy>,
    sleeping: Vec<bool>,
    pairs: Vec<(usize, usize)>,
    ignored_pairs: HashSet<(BodyId, BodyId)>,
    contact_buffer: Vec<ContactPoint>,
    equations: Vec<Equation>,
    contact_rows: Vec<ContactRow>,
}

impl World {
    /// Create a new physics world with the given configuration.
    pub fn new(config: WorldConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let solver = config.solver.build(
            config.solver_iterations,
            config.solver_tolerance,
            config.warm_starting,
        );
        let broadphase = config.broadphase.build();
        Ok(Self {
            config,
            bodies: hecs::World::new(),
            ids: BTreeMap::new(),
            next_body_id: 0,
            constraints: Vec::new(),
            next_constraint_id: 0,
            materials: MaterialTable::default(),
            broadphase,
            generator: ContactGenerator::new(),
            solver,
            contact_cache: ContactCache::new(),
            matrix: CollisionMatrix::new(),
            previous_matrix: CollisionMatrix::new(),
            manifolds: Vec::new(),
            events: Vec::new(),
            listeners: Vec::new(),
            accumulator: 0.0,
            time: 0.0,
            step_count: 0,
            stats: StepStats::default(),
            handles: Vec::new(),
            body_ids: Vec::new(),
            index_of: HashMap::new(),
            solver_bodies: Vec::new(),
            proxies: Vec::new(),
            sleeping: Vec::new(),
            pairs: Vec::new(),
            ignored_pairs: HashSet::new(),
            contact_buffer: Vec::new(),
            equations: Vec::new(),
            contact_rows: Vec::new(),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    /// Simulated seconds so far.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    // ---- bodies ----

    /// Register a body. Dynamic bodies need a positive, finite mass; inertia
    /// is derived from the collider.
    pub fn add_body(
        &mut self,
        mut rigid_body: RigidBody,
        collider: Collider,
    ) -> Result<BodyHandle, PhysicsError> {
        if rigid_body.is_dynamic() && !(rigid_body.mass().is_finite() && rigid_body.mass() > 0.0) {
            return Err(PhysicsError::InvalidMass(rigid_body.mass()));
        }
        if let Some(material) = rigid_body.material {
            if !self.materials.contains(material) {
                return Err(PhysicsError::UnknownMaterial(material));
            }
        }

        let id = BodyId(self.next_body_id);
        self.next_body_id += 1;
        rigid_body.id = id;
        rigid_body.rotation = rigid_body.rotation.normalize();
        rigid_body.update_mass_properties(&collider);

        let handle = self
            .bodies
            .spawn((rigid_body, collider, SleepInfo::default()));
        self.ids.insert(id, handle);
        tracing::debug!(body = id.0, "added body");
        Ok(handle)
    }

    /// Remove a body along with every constraint attached to it.
    ///
    /// No `End` event is reported for pairs the body was part of.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(RigidBody, Collider), PhysicsError> {
        let (rigid_body, collider, _) = self
            .bodies
            .remove::<(RigidBody, Collider, SleepInfo)>(handle)
            .map_err(|_| PhysicsError::UnknownBody(handle))?;
        // the entity is empty now; despawning cannot fail
        let _ = self.bodies.despawn(handle);

        let id = rigid_body.id();
        self.ids.remove(&id);
        self.constraints
            .retain(|(_, c)| c.body_a != handle && c.body_b != handle);
        self.matrix.remove_body(id);
        self.previous_matrix.remove_body(id);
        self.contact_cache.remove_body(id);
        self.manifolds.retain(|m| m.id_a != id && m.id_b != id);
        tracing::debug!(body = id.0, "removed body");
        Ok((rigid_body, collider))
    }

    pub fn body(&self, handle: BodyHandle) -> Result<hecs::Ref<'_, RigidBody>, PhysicsError> {
        self.bodies
            .get::<&RigidBody>(handle)
            .map_err(|_| PhysicsError::UnknownBody(handle))
    }

    /// Mutable access to a body. Changing its mass or collider afterwards is not supported.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<hecs::RefMut<'_, RigidBody>, PhysicsError> {
        self.bodies
            .get::<&mut RigidBody>(handle)
            .map_err(|_| PhysicsError::UnknownBody(handle))
    }

    pub fn collider(&self, handle: BodyHandle) -> Result<hecs::Ref<'_, Collider>, PhysicsError> {
        self.bodies
            .get::<&Collider>(handle)
            .map_err(|_| PhysicsError::UnknownBody(handle))
    }

    pub fn is_sleeping(&self, handle: BodyHandle) -> Result<bool, PhysicsError> {
        self.bodies
            .get::<&SleepInfo>(handle)
            .map(|s| s.is_sleeping())
            .map_err(|_| PhysicsError::UnknownBody(handle))
    }

    pub fn body_handle(&self, id: BodyId) -> Option<BodyHandle> {
        self.ids.get(&id).copied()
    }

    pub fn body_count(&self) -> usize {
        self.ids.len()
    }

    /// Handles of all bodies in registration order.
    pub fn bodies(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.ids.values().copied()
    }

    /// Accumulate a force at a world point for the next step, waking the body.
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec3, point: Vec3) -> Result<(), PhysicsError> {
        self.body_mut(handle)?.apply_force(force, point);
        body::wake_body(&mut self.bodies, handle);
        Ok(())
    }

    /// Change a body's velocity immediately, waking it.
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3, point: Vec3) -> Result<(), PhysicsError> {
        self.body_mut(handle)?.apply_impulse(impulse, point);
        body::wake_body(&mut self.bodies, handle);
        Ok(())
    }

    /// Wake a body. Returns whether it was asleep.
    pub fn wake_up(&mut self, handle: BodyHandle) -> Result<bool, PhysicsError> {
        if !self.bodies.contains(handle) {
            return Err(PhysicsError::UnknownBody(handle));
        }
        Ok(body::wake_body(&mut self.bodies, handle))
    }

    // ---- materials ----

    /// Register a surface material. Friction must be non-negative and
    /// restitution within [0, 1].
    pub fn add_material(&mut self, material: Material) -> Result<MaterialId, PhysicsError> {
        self.materials.add(material)
    }

    /// Override the contact parameters used between two materials.
    pub fn add_contact_material(
        &mut self,
        a: MaterialId,
        b: MaterialId,
        contact: ContactMaterial,
    ) -> Result<(), PhysicsError> {
        self.materials.set_pair(a, b, contact)
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    // ---- constraints ----

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintHandle, PhysicsError> {
        for handle in [constraint.body_a, constraint.body_b] {
            if !self.bodies.contains(handle) {
                return Err(PhysicsError::UnknownBody(handle));
            }
        }
        if constraint.body_a == constraint.body_b {
            return Err(PhysicsError::SelfConstraint(constraint.body_a));
        }
        constraint.validate().map_err(PhysicsError::InvalidConfig)?;

        let handle = ConstraintHandle(self.next_constraint_id);
        self.next_constraint_id += 1;
        tracing::debug!(constraint = handle.0, joint = ?constraint.joint, "added constraint");
        self.constraints.push((handle, constraint));
        Ok(handle)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Result<Constraint, PhysicsError> {
        let index = self
            .constraints
            .iter()
            .position(|(h, _)| *h == handle)
            .ok_or(PhysicsError::UnknownConstraint(handle))?;
        tracing::debug!(constraint = handle.0, "removed constraint");
        Ok(self.constraints.remove(index).1)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Result<&Constraint, PhysicsError> {
        self.constraints
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, c)| c)
            .ok_or(PhysicsError::UnknownConstraint(handle))
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Result<&mut Constraint, PhysicsError> {
        self.constraints
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, c)| c)
            .ok_or(PhysicsError::UnknownConstraint(handle))
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // ---- results ----

    /// Contact manifolds found by the last step.
    pub fn contacts(&self) -> &[ContactManifold] {
        &self.manifolds
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Whether the two bodies touched during the last step.
    pub fn in_contact(&self, a: BodyId, b: BodyId) -> bool {
        self.previous_matrix.get(a, b)
    }

    /// Take the queued collision events. Events accumulate until drained.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, CollisionEvent> {
        self.events.drain(..)
    }

    pub fn add_listener(&mut self, listener: impl FnMut(&CollisionEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ---- queries ----

    /// Nearest body along the ray. Ties go to the lower body id.
    pub fn raycast(&self, ray: &Ray) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        self.visit_ray_hits(ray, |hit| {
            if best.map_or(true, |b| hit.distance < b.distance) {
                best = Some(hit);
            }
        });
        best
    }

    /// The nearest hit on every body the ray meets, ordered by distance.
    pub fn raycast_all(&self, ray: &Ray) -> Vec<RayHit> {
        let mut hits = Vec::new();
        self.visit_ray_hits(ray, |hit| hits.push(hit));
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits
    }

    /// Bounds are recomputed from current poses, so edits since the last step are seen.
    fn visit_ray_hits(&self, ray: &Ray, mut visit: impl FnMut(RayHit)) {
        if !ray.is_valid() {
            return;
        }
        for (&id, &handle) in &self.ids {
            let Ok(mut query) = self.bodies.query_one::<(&RigidBody, &Collider)>(handle) else {
                continue;
            };
            let Some((rb, collider)) = query.get() else {
                continue;
            };
            if !ray.accepts(&rb.filter) || (collider.is_sensor && !ray.hit_sensors) {
                continue;
            }
            let pose = rb.pose();
            if ray.aabb_interval(&collider.aabb(&pose)).is_none() {
                continue;
            }
            let nearest = collider
                .parts
                .iter()
                .filter_map(|part| intersect_shape(ray, &part.shape, &pose.compose(&part.local_pose())))
                .min_by(|a, b| a.distance.total_cmp(&b.distance));
            if let Some(hit) = nearest {
                visit(RayHit {
                    body: handle,
                    id,
                    point: hit.point,
                    normal: hit.normal,
                    distance: hit.distance,
                });
            }
        }
    }

    // ---- stepping ----

    /// Advance by `elapsed` seconds using fixed steps. Returns the number of steps taken.
    ///
    /// At most `max_substeps` steps run per call; time beyond that is dropped.
    /// Negative or non-finite `elapsed` is ignored.
    pub fn advance(&mut self, elapsed: f64) -> u32 {
        if !(elapsed.is_finite() && elapsed >= 0.0) {
            tracing::warn!(elapsed, "ignoring invalid elapsed time");
            return 0;
        }
        self.accumulator += elapsed;

        let mut substeps = 0u32;
        while self.accumulator >= self.config.fixed_timestep && substeps < self.config.max_substeps {
            self.step();
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
        }

        // Clamp accumulator to avoid spiral of death
        if self.accumulator > self.config.fixed_timestep * self.config.max_substeps as f64 {
            tracing::warn!(
                dropped = self.accumulator,
                "physics fell behind; dropping accumulated time"
            );
            self.accumulator = 0.0;
        }
        substeps
    }

    /// Run one fixed step.
    pub fn step(&mut self) {
        let dt = self.config.fixed_timestep as f32;
        let _span = tracing::trace_span!("physics_step", step = self.step_count).entered();
        self.stats = StepStats::default();

        // 1. Apply forces (gravity)
        body::apply_gravity(&mut self.bodies, self.config.gravity);
        body::update_world_inertia(&mut self.bodies);
        self.collect_bodies();

        // 2. Broadphase collision detection
        self.broadphase
            .collision_pairs(&self.proxies, &mut self.pairs);
        self.stats.broadphase_pairs = self.pairs.len();

        // 3. Narrowphase collision detection
        self.narrowphase();
        self.wake_touched_bodies();
        if self.config.warm_starting {
            self.contact_cache.warm_start(&mut self.manifolds);
        }

        // 4. Assemble equations
        self.assemble_equations(dt);

        // 5. Solve
        let solve = self
            .solver
            .solve(dt, &mut self.solver_bodies, &mut self.equations);
        self.stats.solver_iterations = solve.iterations;
        self.stats.islands = solve.islands;
        self.store_impulses();
        self.contact_cache.update(&self.manifolds);

        // 6. Integrate
        self.write_velocities();
        body::integrate(&mut self.bodies, dt);

        // 7. Events
        self.fire_events();

        // 8. Clear force accumulators, sleep
        body::clear_forces(&mut self.bodies);
        if self.config.allow_sleep {
            body::update_sleep_states(
                &mut self.bodies,
                dt,
                self.config.sleep_speed_limit,
                self.config.sleep_time_limit,
            );
        }

        std::mem::swap(&mut self.matrix, &mut self.previous_matrix);
        self.matrix.reset();
        self.time += self.config.fixed_timestep;
        self.step_count += 1;
    }

    /// Snapshot every body in id order into the solver and broadphase arrays.
    fn collect_bodies(&mut self) {
        self.handles.clear();
        self.body_ids.clear();
        self.index_of.clear();
        self.solver_bodies.clear();
        self.proxies.clear();
        self.sleeping.clear();

        for (&id, &handle) in &self.ids {
            let Ok(mut query) = self
                .bodies
                .query_one::<(&RigidBody, &Collider, &SleepInfo)>(handle)
            else {
                continue;
            };
            let Some((rb, collider, sleep)) = query.get() else {
                continue;
            };
            let is_sleeping = sleep.is_sleeping();

            self.index_of.insert(handle, self.handles.len());
            self.handles.push(handle);
            self.body_ids.push(id);
            self.sleeping.push(is_sleeping);
            self.solver_bodies.push(SolverBody::from_body(rb, Some(sleep)));
            self.proxies.push(BroadphaseProxy {
                aabb: collider.aabb(&rb.pose()),
                dynamic: rb.body_type == RigidBodyType::Dynamic,
                active: rb.body_type != RigidBodyType::Static && !is_sleeping,
                filter: rb.filter,
            });
        }
    }

    fn narrowphase(&mut self) {
        self.manifolds.clear();
        self.ignored_pairs.clear();
        for (_, c) in &self.constraints {
            if c.collide_connected {
                continue;
            }
            if let (Some(&ia), Some(&ib)) = (self.index_of.get(&c.body_a), self.index_of.get(&c.body_b)) {
                self.ignored_pairs
                    .insert(ordered(self.body_ids[ia], self.body_ids[ib]));
            }
        }

        for &(ia, ib) in &self.pairs {
            let (id_a, id_b) = (self.body_ids[ia], self.body_ids[ib]);
            if self.ignored_pairs.contains(&(id_a, id_b)) {
                continue;
            }
            let (ha, hb) = (self.handles[ia], self.handles[ib]);
            let (Ok(rb_a), Ok(rb_b)) = (
                self.bodies.get::<&RigidBody>(ha),
                self.bodies.get::<&RigidBody>(hb),
            ) else {
                continue;
            };
            let (Ok(collider_a), Ok(collider_b)) = (
                self.bodies.get::<&Collider>(ha),
                self.bodies.get::<&Collider>(hb),
            ) else {
                continue;
            };

            self.contact_buffer.clear();
            let (pose_a, pose_b) = (rb_a.pose(), rb_b.pose());
            for part_a in &collider_a.parts {
                let part_pose_a = pose_a.compose(&part_a.local_pose());
                for part_b in &collider_b.parts {
                    let part_pose_b = pose_b.compose(&part_b.local_pose());
                    let start = self.contact_buffer.len();
                    if let Err(err) = self.generator.generate(
                        &part_a.shape,
                        &part_pose_a,
                        &part_b.shape,
                        &part_pose_b,
                        &mut self.contact_buffer,
                    ) {
                        tracing::debug!(body_a = id_a.0, body_b = id_b.0, %err, "dropping degenerate pair");
                        self.contact_buffer.truncate(start);
                        self.stats.degenerate_pairs += 1;
                    }
                }
            }
            self.contact_buffer
                .retain(|c| c.depth >= 0.0 && c.depth.is_finite());
            if self.contact_buffer.is_empty() {
                continue;
            }

            self.matrix.set(id_a, id_b, true);
            let material =
                self.materials
                    .resolve(rb_a.material, rb_b.material, &self.config.default_contact_material);
            self.stats.contacts += self.contact_buffer.len();
            self.manifolds.push(ContactManifold {
                body_a: ha,
                body_b: hb,
                id_a,
                id_b,
                index_a: ia,
                index_b: ib,
                material,
                is_sensor: collider_a.is_sensor || collider_b.is_sensor,
                contacts: self.contact_buffer.drain(..).collect(),
            });
        }
        self.stats.manifolds = self.manifolds.len();
    }

    /// Wake sleeping bodies touched by, or jointed to, a moving awake body.
    fn wake_touched_bodies(&mut self) {
        if !self.config.allow_sleep {
            return;
        }
        let limit_sq = self.config.sleep_speed_limit * self.config.sleep_speed_limit;
        let moving = |i: usize, bodies: &[SolverBody], sleeping: &[bool]| {
            let b = &bodies[i];
            !sleeping[i]
                && b.linear_velocity.length_squared() + b.angular_velocity.length_squared() > limit_sq
        };

        let mut to_wake = Vec::new();
        let links = self
            .manifolds
            .iter()
            .filter(|m| !m.is_sensor)
            .map(|m| (m.index_a, m.index_b))
            .chain(self.constraints.iter().filter_map(|(_, c)| {
                Some((*self.index_of.get(&c.body_a)?, *self.index_of.get(&c.body_b)?))
            }));
        for (ia, ib) in links {
            if self.sleeping[ia] && moving(ib, &self.solver_bodies, &self.sleeping) {
                to_wake.push(ia);
            }
            if self.sleeping[ib] && moving(ia, &self.solver_bodies, &self.sleeping) {
                to_wake.push(ib);
            }
        }

        for i in to_wake {
            if !self.sleeping[i] {
                continue;
            }
            let handle = self.handles[i];
            body::wake_body(&mut self.bodies, handle);
            self.sleeping[i] = false;
            if let Ok(mut query) = self.bodies.query_one::<(&RigidBody, &SleepInfo)>(handle) {
                if let Some((rb, sleep)) = query.get() {
                    self.solver_bodies[i] = SolverBody::from_body(rb, Some(sleep));
                }
            }
            tracing::debug!(body = self.body_ids[i].0, "body woken by contact");
        }
    }

    fn assemble_equations(&mut self, dt: f32) {
        self.equations.clear();
        self.contact_rows.clear();

        for (mi, manifold) in self.manifolds.iter().enumerate() {
            let (ia, ib) = (manifold.index_a, manifold.index_b);
            let (a, b) = (&self.solver_bodies[ia], &self.solver_bodies[ib]);
            if manifold.is_sensor || !(a.is_movable() || b.is_movable()) {
                continue;
            }
            let material = &manifold.material;
            let contact_spook = Spook::new(material.contact_stiffness, material.contact_relaxation, dt);
            let friction_spook =
                Spook::new(material.friction_stiffness, material.friction_relaxation, dt);

            for (ci, contact) in manifold.contacts.iter().enumerate() {
                let ra = contact.position - a.position;
                let rb = contact.position - b.position;
                let row = self.equations.len();
                self.equations.push(
                    Equation::contact(
                        ia,
                        ib,
                        ra,
                        rb,
                        contact.normal,
                        contact.depth,
                        material.restitution,
                        contact_spook,
                    )
                    .with_impulse(contact.normal_impulse),
                );

                let friction = material.friction > 0.0;
                if friction {
                    for (k, tangent) in contact.tangents().into_iter().enumerate() {
                        self.equations.push(
                            Equation::friction(ia, ib, ra, rb, tangent, material.friction, row, friction_spook)
                                .with_impulse(contact.tangent_impulse[k]),
                        );
                    }
                }
                self.contact_rows.push(ContactRow {
                    manifold: mi,
                    contact: ci,
                    equation: row,
                    friction,
                });
            }
        }

        for (_, constraint) in &self.constraints {
            let (Some(&ia), Some(&ib)) = (
                self.index_of.get(&constraint.body_a),
                self.index_of.get(&constraint.body_b),
            ) else {
                continue;
            };
            constraint.build_equations(ia, ib, &self.solver_bodies, dt, &mut self.equations);
        }
        self.stats.equations = self.equations.len();
    }

    /// Copy solved contact impulses back onto the manifolds for the cache.
    fn store_impulses(&mut self) {
        for row in &self.contact_rows {
            let contact = &mut self.manifolds[row.manifold].contacts[row.contact];
            contact.normal_impulse = self.equations[row.equation].impulse;
            if row.friction {
                contact.tangent_impulse = [
                    self.equations[row.equation + 1].impulse,
                    self.equations[row.equation + 2].impulse,
                ];
            }
        }
    }

    fn write_velocities(&mut self) {
        for (i, solved) in self.solver_bodies.iter().enumerate() {
            if !solved.is_movable() {
                continue;
            }
            if let Ok(mut rb) = self.bodies.get::<&mut RigidBody>(self.handles[i]) {
                let (linear, angular) = solved.solved_velocity();
                rb.linear_velocity = linear;
                rb.angular_velocity = angular;
            }
        }
    }

    fn fire_events(&mut self) {
        let start = self.events.len();

        for manifold in &self.manifolds {
            if !self.previous_matrix.get(manifold.id_a, manifold.id_b) {
                self.events.push(CollisionEvent {
                    kind: CollisionEventKind::Begin,
                    body_a: manifold.body_a,
                    body_b: manifold.body_b,
                    id_a: manifold.id_a,
                    id_b: manifold.id_b,
                    contacts: manifold.contacts.clone(),
                });
            }
        }
        for (id_a, id_b) in self.previous_matrix.iter() {
            if self.matrix.get(id_a, id_b) {
                continue;
            }
            // neither body can move, so the broadphase skipped a pair that still touches
            if !self.is_active(id_a) && !self.is_active(id_b) {
                self.matrix.set(id_a, id_b, true);
                continue;
            }
            let (Some(&body_a), Some(&body_b)) = (self.ids.get(&id_a), self.ids.get(&id_b)) else {
                continue;
            };
            self.events.push(CollisionEvent {
                kind: CollisionEventKind::End,
                body_a,
                body_b,
                id_a,
                id_b,
                contacts: Vec::new(),
            });
        }

        let fresh = &mut self.events[start..];
        fresh.sort_by_key(|e| (e.id_a, e.id_b));
        for event in fresh.iter() {
            for listener in &mut self.listeners {
                listener(event);
            }
        }
    }

    fn is_active(&self, id: BodyId) -> bool {
        self.body_ids
            .binary_search(&id)
            .is_ok_and(|i| self.proxies[i].active)
    }
}

fn ordered(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::CollisionFilter;
    use crate::shape::Shape;

    fn world() -> World {
        World::new(WorldConfig::default()).unwrap()
    }

    fn sphere(world: &mut World, position: Vec3) -> BodyHandle {
        world
            .add_body(
                RigidBody::new_dynamic(1.0).with_position(position),
                Collider::new(Shape::sphere(0.5).unwrap()),
            )
            .unwrap()
    }

    fn ground(world: &mut World) -> BodyHandle {
        world
            .add_body(RigidBody::new_static(), Collider::new(Shape::Plane))
            .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = WorldConfig {
            fixed_timestep: -1.0,
            ..Default::default()
        };
        assert!(matches!(World::new(config), Err(PhysicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_rotation_renormalized_each_step() {
        let mut world = world();
        let body = sphere(&mut world, Vec3::new(0.0, 10.0, 0.0));
        {
            let mut rb = world.body_mut(body).unwrap();
            rb.rotation = glam::Quat::from_rotation_y(0.4) * 2.5;
            rb.angular_velocity = Vec3::ZERO;
        }
        world.step();
        let rb = world.body(body).unwrap();
        assert!((rb.rotation.length() - 1.0).abs() < 1e-6);
        assert!(rb.rotation.abs_diff_eq(glam::Quat::from_rotation_y(0.4), 1e-5));
    }

    #[test]
    fn test_free_fall() {
        let mut world = world();
        let body = sphere(&mut world, Vec3::new(0.0, 10.0, 0.0));

        // Simulate ~1 second
        for _ in 0..60 {
            world.step();
        }

        let rb = world.body(body).unwrap();
        assert!(rb.position.y < 10.0 - 4.0, "y = {}", rb.position.y);
        assert!(rb.linear_velocity.y < -9.0);
        assert!((world.time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_body_validation() {
        let mut world = world();
        let err = world
            .add_body(RigidBody::new_dynamic(0.0), Collider::new(Shape::Particle))
            .unwrap_err();
        assert_eq!(err, PhysicsError::InvalidMass(0.0));

        let mut other = World::new(WorldConfig::default()).unwrap();
        let foreign = other.add_material(Material::new("ice")).unwrap();
        let err = world
            .add_body(
                RigidBody::new_dynamic(1.0).with_material(foreign),
                Collider::new(Shape::Particle),
            )
            .unwrap_err();
        assert_eq!(err, PhysicsError::UnknownMaterial(foreign));
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_ids_are_monotonic_and_resolvable() {
        let mut world = world();
        let a = sphere(&mut world, Vec3::ZERO);
        let b = sphere(&mut world, Vec3::X * 5.0);
        world.remove_body(a).unwrap();
        let c = sphere(&mut world, Vec3::X * 10.0);

        let id_b = world.body(b).unwrap().id();
        let id_c = world.body(c).unwrap().id();
        assert!(id_c > id_b);
        assert_eq!(world.body_handle(id_c), Some(c));
        assert_eq!(world.bodies().collect::<Vec<_>>(), vec![b, c]);
        assert!(matches!(world.body(a), Err(PhysicsError::UnknownBody(_))));
    }

    #[test]
    fn test_remove_body_drops_constraints() {
        let mut world = world();
        let a = sphere(&mut world, Vec3::ZERO);
        let b = sphere(&mut world, Vec3::X * 2.0);
        let handle = world.add_constraint(Constraint::distance(a, b, 2.0)).unwrap();
        world.remove_body(b).unwrap();
        assert_eq!(world.constraint_count(), 0);
        assert!(matches!(
            world.remove_constraint(handle),
            Err(PhysicsError::UnknownConstraint(_))
        ));
    }

    #[test]
    fn test_constraint_validation() {
        let mut world = world();
        let a = sphere(&mut world, Vec3::ZERO);
        assert_eq!(
            world.add_constraint(Constraint::distance(a, a, 1.0)),
            Err(PhysicsError::SelfConstraint(a))
        );
        let b = sphere(&mut world, Vec3::X);
        let bad = Constraint::distance(a, b, 1.0).with_max_force(-1.0);
        assert!(matches!(world.add_constraint(bad), Err(PhysicsError::InvalidConfig(_))));

        let flat = Constraint::hinge(a, Vec3::ZERO, Vec3::ZERO, b, Vec3::ZERO, Vec3::ZERO);
        assert!(matches!(world.add_constraint(flat), Err(PhysicsError::InvalidConfig(_))));
        assert_eq!(world.constraint_count(), 0);
    }

    #[test]
    fn test_contact_manifold_and_events() {
        let mut world = world();
        let ground = ground(&mut world);
        let ball = sphere(&mut world, Vec3::new(0.0, 0.45, 0.0));

        world.step();
        assert_eq!(world.contacts().len(), 1);
        let manifold = &world.contacts()[0];
        assert_eq!((manifold.body_a, manifold.body_b), (ground, ball));
        // normal from ground toward ball
        assert!(manifold.contacts[0].normal.y > 0.99);

        let events: Vec<_> = world.drain_events().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, CollisionEventKind::Begin);
        assert!(!events[0].contacts.is_empty());

        // staying in contact produces no new events
        world.step();
        assert_eq!(world.drain_events().count(), 0);

        world.body_mut(ball).unwrap().position.y = 5.0;
        world.step();
        let events: Vec<_> = world.drain_events().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, CollisionEventKind::End);
        assert_eq!((events[0].body_a, events[0].body_b), (ground, ball));
    }

    #[test]
    fn test_sensor_reports_without_response() {
        let mut world = world();
        world
            .add_body(RigidBody::new_static(), Collider::new(Shape::cuboid(Vec3::ONE).unwrap()).sensor())
            .unwrap();
        let ball = sphere(&mut world, Vec3::new(0.0, 1.2, 0.0));
        world.body_mut(ball).unwrap().linear_velocity = Vec3::new(0.0, -1.0, 0.0);

        world.step();
        assert_eq!(world.stats().manifolds, 1);
        assert_eq!(world.stats().equations, 0);
        assert_eq!(world.drain_events().count(), 1);
        // passes straight through
        assert!(world.body(ball).unwrap().linear_velocity.y < -1.0);
    }

    #[test]
    fn test_raycast_nearest_body() {
        let mut world = world();
        let plane = ground(&mut world);
        let ball = sphere(&mut world, Vec3::new(0.0, 3.0, 0.0));
        let down = Ray::new(Vec3::new(0.0, 10.0, 0.0), -Vec3::Y);

        let hit = world.raycast(&down).unwrap();
        assert_eq!(hit.body, ball);
        assert!((hit.distance - 6.5).abs() < 1e-5);
        assert!((hit.normal - Vec3::Y).length() < 1e-5);

        let all = world.raycast_all(&down);
        assert_eq!(all.iter().map(|h| h.body).collect::<Vec<_>>(), vec![ball, plane]);
        assert!((all[1].distance - 10.0).abs() < 1e-5);

        let beside = world.raycast(&Ray::new(Vec3::new(5.0, 10.0, 0.0), -Vec3::Y)).unwrap();
        assert_eq!(beside.body, plane);
        assert!(world.raycast(&down.with_max_distance(5.0)).is_none());

        // moving a body is seen without stepping
        world.body_mut(ball).unwrap().position = Vec3::new(5.0, 3.0, 0.0);
        assert_eq!(world.raycast(&down).unwrap().body, plane);
    }

    #[test]
    fn test_raycast_mask_and_sensors() {
        let mut world = world();
        ground(&mut world);
        let ball = world
            .add_body(
                RigidBody::new_dynamic(1.0)
                    .with_position(Vec3::new(0.0, 3.0, 0.0))
                    .with_filter(CollisionFilter { group: 2, mask: u32::MAX }),
                Collider::new(Shape::sphere(0.5).unwrap()),
            )
            .unwrap();
        let down = Ray::new(Vec3::new(0.0, 10.0, 0.0), -Vec3::Y);
        assert_eq!(world.raycast(&down).unwrap().body, ball);
        assert_ne!(world.raycast(&down.with_mask(1)).unwrap().body, ball);

        let trigger = world
            .add_body(
                RigidBody::new_static().with_position(Vec3::new(0.0, 6.0, 0.0)),
                Collider::new(Shape::cuboid(Vec3::ONE).unwrap()).sensor(),
            )
            .unwrap();
        assert_eq!(world.raycast(&down).unwrap().body, ball);
        let hit = world.raycast(&down.with_sensors(true)).unwrap();
        assert_eq!(hit.body, trigger);
        assert!((hit.distance - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_collide_connected_false_skips_contacts() {
        let mut world = world();
        let a = sphere(&mut world, Vec3::ZERO);
        let b = sphere(&mut world, Vec3::new(0.8, 0.0, 0.0));
        world
            .add_constraint(Constraint::distance(a, b, 0.8).with_collide_connected(false))
            .unwrap();
        world.step();
        assert!(world.contacts().is_empty());
        assert_eq!(world.stats().equations, 1);
    }

    #[test]
    fn test_listener_called() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut world = world();
        ground(&mut world);
        sphere(&mut world, Vec3::new(0.0, 0.4, 0.0));
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        world.add_listener(move |event| {
            if event.kind == CollisionEventKind::Begin {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        world.step();
        world.step();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_advance_fixed_steps() {
        let mut world = world();
        assert_eq!(world.advance(1.0 / 120.0), 0);
        assert_eq!(world.advance(1.0 / 120.0 + 1e-9), 1);
        // far behind: clamped to max_substeps and the rest dropped
        assert_eq!(world.advance(10.0), 4);
        assert_eq!(world.advance(0.0), 0);
        assert_eq!(world.step_count(), 5);
    }

    #[test]
    fn test_advance_ignores_invalid_elapsed() {
        let mut world = world();
        for elapsed in [f64::NAN, f64::INFINITY, -1.0] {
            assert_eq!(world.advance(elapsed), 0);
        }
        // the accumulator is still usable afterwards
        assert_eq!(world.advance(1.0 / 60.0 + 1e-9), 1);
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_invalid_material_rejected() {
        let mut world = world();
        let err = world
            .add_material(Material::new("flubber").with_restitution(2.0))
            .unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidConfig(_)));
        assert!(world
            .add_material(Material::new("tar").with_friction(-1.0))
            .is_err());
    }

    #[test]
    fn test_material_pair_friction() {
        let mut world = world();
        let ice = world.add_material(Material::new("ice").with_friction(0.0)).unwrap();
        let steel = world.add_material(Material::new("steel").with_friction(0.5)).unwrap();
        world
            .add_contact_material(ice, steel, ContactMaterial::default().with_friction(0.05))
            .unwrap();
        world
            .add_body(
                RigidBody::new_static().with_material(ice),
                Collider::new(Shape::Plane),
            )
            .unwrap();
        world
            .add_body(
                RigidBody::new_dynamic(1.0)
                    .with_position(Vec3::new(0.0, 0.45, 0.0))
                    .with_material(steel),
                Collider::new(Shape::sphere(0.5).unwrap()),
            )
            .unwrap();
        world.step();
        assert!((world.contacts()[0].material.friction - 0.05).abs() < 1e-6);
        // one contact plus two friction rows
        assert_eq!(world.stats().equations, 3);
    }

    #[test]
    fn test_apply_force_and_impulse() {
        let mut world = World::new(WorldConfig {
            gravity: Vec3::ZERO,
            ..Default::default()
        })
        .unwrap();
        let ball = sphere(&mut world, Vec3::ZERO);
        world.apply_impulse(ball, Vec3::X * 2.0, Vec3::ZERO).unwrap();
        assert!((world.body(ball).unwrap().linear_velocity.x - 2.0).abs() < 1e-6);

        world.apply_force(ball, Vec3::Y * 60.0, Vec3::ZERO).unwrap();
        world.step();
        let rb = world.body(ball).unwrap();
        assert!((rb.linear_velocity.y - 1.0).abs() < 0.01);
        // forces are cleared after the step
        assert_eq!(rb.force_accumulator, Vec3::ZERO);
    }
}
