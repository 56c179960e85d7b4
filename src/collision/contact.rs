//! Contact data structures and the warm-starting cache.

use std::collections::HashMap;

use glam::Vec3;

use crate::dynamics::{BodyHandle, BodyId, ContactMaterial};

/// A single contact point with accumulated impulse data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// World-space point halfway between the two surfaces.
    pub position: Vec3,
    /// Unit normal from shape A to shape B.
    pub normal: Vec3,
    /// Penetration depth.
    pub depth: f32,
    /// Accumulated normal impulse.
    pub normal_impulse: f32,
    /// Accumulated impulses along [`tangents`](Self::tangents).
    pub tangent_impulse: [f32; 2],
}

impl ContactPoint {
    pub fn new(position: Vec3, normal: Vec3, depth: f32) -> Self {
        Self {
            position,
            normal,
            depth,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
        }
    }

    /// Same contact seen from the other body.
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }

    /// Friction directions; a fixed function of the normal.
    #[inline]
    pub fn tangents(&self) -> [Vec3; 2] {
        let (t1, t2) = self.normal.any_orthonormal_pair();
        [t1, t2]
    }

    /// Accumulated friction impulse as a world-space vector.
    pub fn friction_impulse(&self) -> Vec3 {
        let [t1, t2] = self.tangents();
        t1 * self.tangent_impulse[0] + t2 * self.tangent_impulse[1]
    }

    /// Express a world-space friction impulse in this contact's tangent basis.
    /// Any part along the normal is dropped.
    pub fn set_friction_impulse(&mut self, impulse: Vec3) {
        let [t1, t2] = self.tangents();
        self.tangent_impulse = [impulse.dot(t1), impulse.dot(t2)];
    }
}

/// The contact points of one body pair for one step.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub id_a: BodyId,
    pub id_b: BodyId,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub material: ContactMaterial,
    /// Either collider is a sensor: reported, never solved.
    pub is_sensor: bool,
    pub contacts: Vec<ContactPoint>,
}

/// Cached contact data for warm-starting the solver.
#[derive(Debug, Clone, Copy)]
struct CachedContact {
    /// Contact position in world space (used for matching).
    position: Vec3,
    /// Accumulated normal impulse from previous step.
    normal_impulse: f32,
    /// Friction impulse in world space, signed for the lower body id as A.
    /// Stored as a vector so a rotated tangent basis picks it up.
    friction_impulse: Vec3,
}

/// Maximum distance squared for matching contacts across steps.
const CONTACT_MATCH_THRESHOLD_SQ: f32 = 0.02 * 0.02;

/// Cache of contact impulses for warm-starting the constraint solver.
///
/// Stores accumulated impulses from the previous step keyed by body pair.
/// Each new contact takes the impulses of the nearest cached contact of the
/// same pair, if it lies within the match radius. The friction impulse is
/// projected onto the new contact's tangent plane.
#[derive(Debug, Clone, Default)]
pub struct ContactCache {
    cache: HashMap<(BodyId, BodyId), Vec<CachedContact>>,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed current manifolds with cached impulses.
    pub fn warm_start(&self, manifolds: &mut [ContactManifold]) {
        for manifold in manifolds.iter_mut() {
            let key = Self::pair_key(manifold.id_a, manifold.id_b);
            let Some(cached) = self.cache.get(&key) else {
                continue;
            };
            let sign = Self::order_sign(manifold);
            for contact in &mut manifold.contacts {
                let nearest = cached.iter().min_by(|a, b| {
                    let da = (a.position - contact.position).length_squared();
                    let db = (b.position - contact.position).length_squared();
                    da.total_cmp(&db)
                });
                if let Some(cc) = nearest {
                    if (cc.position - contact.position).length_squared() < CONTACT_MATCH_THRESHOLD_SQ {
                        contact.normal_impulse = cc.normal_impulse;
                        contact.set_friction_impulse(cc.friction_impulse * sign);
                    }
                }
            }
        }
    }

    /// Replace the cache with this step's solved contacts.
    pub fn update(&mut self, manifolds: &[ContactManifold]) {
        self.cache.clear();
        for manifold in manifolds.iter().filter(|m| !m.is_sensor) {
            let key = Self::pair_key(manifold.id_a, manifold.id_b);
            let sign = Self::order_sign(manifold);
            let contacts = manifold
                .contacts
                .iter()
                .map(|c| CachedContact {
                    position: c.position,
                    normal_impulse: c.normal_impulse,
                    friction_impulse: c.friction_impulse() * sign,
                })
                .collect();
            self.cache.insert(key, contacts);
        }
    }

    /// Forget everything cached for `body`.
    pub fn remove_body(&mut self, body: BodyId) {
        self.cache.retain(|&(a, b), _| a != body && b != body);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    // Friction acts on B along +t; swapping A and B reverses the vector.
    fn order_sign(manifold: &ContactManifold) -> f32 {
        if manifold.id_a <= manifold.id_b {
            1.0
        } else {
            -1.0
        }
    }

    fn pair_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
