//! Ray queries against posed shapes.
//!
//! A ray that starts inside a solid reports where it leaves it, with the
//! outward normal there.

use glam::Vec3;

use crate::dynamics::CollisionFilter;
use crate::math::Pose;
use crate::shape::{Aabb, ConvexPolyhedron, Heightfield, Shape};

/// Directions shorter than this on one axis are treated as parallel to that slab.
const RAY_PARALLEL_EPSILON: f32 = 1e-9;

/// A half-line segment from `origin` along a unit `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length, or zero for a ray that hits nothing.
    pub direction: Vec3,
    pub max_distance: f32,
    /// Bodies whose group is not in this mask are skipped.
    pub mask: u32,
    /// Whether sensor colliders can be hit.
    pub hit_sensors: bool,
}

impl Ray {
    /// Unbounded ray; `direction` is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance: f32::INFINITY,
            mask: u32::MAX,
            hit_sensors: false,
        }
    }

    /// Ray from `from` that ends at `to`.
    pub fn between(from: Vec3, to: Vec3) -> Self {
        Self::new(from, to - from).with_max_distance(from.distance(to))
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_sensors(mut self, hit_sensors: bool) -> Self {
        self.hit_sensors = hit_sensors;
        self
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// A degenerate ray or a non-positive range hits nothing.
    pub fn is_valid(&self) -> bool {
        self.direction != Vec3::ZERO && self.origin.is_finite() && self.max_distance > 0.0
    }

    pub(crate) fn accepts(&self, filter: &CollisionFilter) -> bool {
        filter.group & self.mask != 0
    }

    /// The same ray expressed in a pose's local frame.
    fn to_local(&self, pose: &Pose) -> Ray {
        Ray {
            origin: pose.inverse_transform_point(self.origin),
            direction: pose.inverse_transform_vector(self.direction),
            ..*self
        }
    }

    /// Entry and exit distances through a box, clamped to `[0, max_distance]`.
    pub fn aabb_interval(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let mut t_min = 0.0f32;
        let mut t_max = self.max_distance;
        for axis in 0..3 {
            let (o, d) = (self.origin[axis], self.direction[axis]);
            let (lo, hi) = (aabb.min[axis], aabb.max[axis]);
            if d.abs() < RAY_PARALLEL_EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo - o) * inv, (hi - o) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some((t_min, t_max))
    }
}

/// Where a ray meets a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntersection {
    /// Distance from the ray origin.
    pub distance: f32,
    pub point: Vec3,
    /// Outward surface normal, in world space.
    pub normal: Vec3,
}

impl RayIntersection {
    fn nearer(self, other: Option<RayIntersection>) -> RayIntersection {
        match other {
            Some(o) if o.distance < self.distance => o,
            _ => self,
        }
    }
}

/// Closest intersection of `ray` with a posed shape within the ray's range.
pub fn intersect_shape(ray: &Ray, shape: &Shape, pose: &Pose) -> Option<RayIntersection> {
    if !ray.is_valid() {
        return None;
    }
    match shape {
        Shape::Sphere { radius } => intersect_sphere(ray, pose.position, *radius),
        Shape::Plane => intersect_plane(ray, pose),
        Shape::Box(cuboid) => intersect_hull(ray, cuboid.hull(), pose),
        Shape::ConvexPolyhedron(hull) => intersect_hull(ray, hull, pose),
        Shape::Heightfield(hf) => intersect_heightfield(ray, hf, pose),
        Shape::Ellipsoid { radii } => intersect_ellipsoid(ray, *radii, pose),
        Shape::Particle => None,
        Shape::Compound(children) => children.iter().fold(None, |best, child| {
            match intersect_shape(ray, &child.shape, &pose.compose(&child.pose)) {
                Some(hit) => Some(hit.nearer(best)),
                None => best,
            }
        }),
    }
}

/// Smallest root in `[0, max]` of `a t² + 2 b t + c = 0`, preferring the entry root.
fn first_root(a: f32, b: f32, c: f32, max: f32) -> Option<f32> {
    let disc = b * b - a * c;
    if disc < 0.0 || a <= 0.0 {
        return None;
    }
    let sqrt_d = disc.sqrt();
    [(-b - sqrt_d) / a, (-b + sqrt_d) / a]
        .into_iter()
        .find(|t| (0.0..=max).contains(t))
}

fn intersect_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<RayIntersection> {
    let oc = ray.origin - center;
    let t = first_root(1.0, oc.dot(ray.direction), oc.length_squared() - radius * radius, ray.max_distance)?;
    let point = ray.at(t);
    Some(RayIntersection {
        distance: t,
        point,
        normal: (point - center).normalize_or(Vec3::Y),
    })
}

fn intersect_plane(ray: &Ray, pose: &Pose) -> Option<RayIntersection> {
    let n = pose.transform_vector(Vec3::Y);
    let denom = n.dot(ray.direction);
    if denom.abs() < RAY_PARALLEL_EPSILON {
        return None;
    }
    let t = -n.dot(ray.origin - pose.position) / denom;
    if !(0.0..=ray.max_distance).contains(&t) {
        return None;
    }
    Some(RayIntersection {
        distance: t,
        point: ray.at(t),
        normal: n,
    })
}

/// Clip the ray against every face plane of the hull.
fn intersect_hull(ray: &Ray, hull: &ConvexPolyhedron, pose: &Pose) -> Option<RayIntersection> {
    let local = ray.to_local(pose);
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let (mut enter_face, mut exit_face) = (None, None);

    for (face, normal) in hull.face_normals().iter().enumerate() {
        let dist = normal.dot(local.origin) + hull.face_constant(face);
        let denom = normal.dot(local.direction);
        if denom.abs() < RAY_PARALLEL_EPSILON {
            if dist > 0.0 {
                return None;
            }
            continue;
        }
        let t = -dist / denom;
        if denom < 0.0 {
            if t > t_enter {
                t_enter = t;
                enter_face = Some(face);
            }
        } else if t < t_exit {
            t_exit = t;
            exit_face = Some(face);
        }
        if t_enter > t_exit {
            return None;
        }
    }

    let (t, face) = if t_enter >= 0.0 {
        (t_enter, enter_face?)
    } else {
        (t_exit, exit_face?)
    };
    if !(0.0..=ray.max_distance).contains(&t) {
        return None;
    }
    Some(RayIntersection {
        distance: t,
        point: ray.at(t),
        normal: pose.transform_vector(hull.face_normals()[face]),
    })
}

/// Scale space so the ellipsoid becomes a unit sphere, then solve the quadratic.
fn intersect_ellipsoid(ray: &Ray, radii: Vec3, pose: &Pose) -> Option<RayIntersection> {
    let local = ray.to_local(pose);
    let o = local.origin / radii;
    let d = local.direction / radii;
    let t = first_root(d.length_squared(), o.dot(d), o.length_squared() - 1.0, ray.max_distance)?;
    let hit = local.at(t);
    Some(RayIntersection {
        distance: t,
        point: ray.at(t),
        normal: pose.transform_vector((hit / (radii * radii)).normalize_or(Vec3::Y)),
    })
}

/// Test the prisms of every cell the clipped ray passes over.
fn intersect_heightfield(ray: &Ray, hf: &Heightfield, pose: &Pose) -> Option<RayIntersection> {
    let local = ray.to_local(pose);
    let (t0, t1) = local.aabb_interval(&hf.local_aabb())?;
    let center = local.at(0.5 * (t0 + t1));
    let (xs, zs) = hf.cells_under(center, 0.5 * (t1 - t0))?;

    let mut best: Option<RayIntersection> = None;
    for xi in xs {
        for zi in zs.clone() {
            let Ok(prisms) = hf.cell_prisms(xi, zi) else {
                continue;
            };
            for prism in &prisms {
                if let Some(hit) = intersect_hull(ray, prism, pose) {
                    best = Some(hit.nearer(best));
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_2;

    fn down_from(x: f32, y: f32, z: f32) -> Ray {
        Ray::new(Vec3::new(x, y, z), -Vec3::Y)
    }

    #[test]
    fn test_aabb_interval() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::ONE);
        let (t0, t1) = down_from(0.0, 5.0, 0.0).aabb_interval(&aabb).unwrap();
        assert!((t0 - 4.0).abs() < 1e-6 && (t1 - 6.0).abs() < 1e-6);

        // parallel to the slab and outside it
        assert!(down_from(2.0, 5.0, 0.0).aabb_interval(&aabb).is_none());
        // range ends before the box
        assert!(down_from(0.0, 5.0, 0.0).with_max_distance(3.0).aabb_interval(&aabb).is_none());

        let plane_bounds = Shape::Plane.aabb(&Pose::IDENTITY);
        let (t0, _) = down_from(3.0, 2.0, -7.0).aabb_interval(&plane_bounds).unwrap();
        assert!((t0 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_hit_and_inside() {
        let s = Shape::sphere(1.0).unwrap();
        let pose = Pose::from_position(Vec3::new(0.0, 0.0, 0.0));
        let hit = intersect_shape(&down_from(0.0, 5.0, 0.0), &s, &pose).unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Y).length() < 1e-5);

        // starting inside reports the exit
        let inside = intersect_shape(&down_from(0.0, 0.5, 0.0), &s, &pose).unwrap();
        assert!((inside.distance - 1.5).abs() < 1e-5);
        assert!((inside.normal + Vec3::Y).length() < 1e-5);

        assert!(intersect_shape(&down_from(1.5, 5.0, 0.0), &s, &pose).is_none());
        assert!(intersect_shape(&Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::Y), &s, &pose).is_none());
    }

    #[test]
    fn test_plane_hit() {
        let hit = intersect_shape(&down_from(2.0, 3.0, 1.0), &Shape::Plane, &Pose::IDENTITY).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-6);
        assert_eq!(hit.normal, Vec3::Y);
        assert!((hit.point - Vec3::new(2.0, 0.0, 1.0)).length() < 1e-6);

        let parallel = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X);
        assert!(intersect_shape(&parallel, &Shape::Plane, &Pose::IDENTITY).is_none());
    }

    #[test]
    fn test_rotated_box_hit() {
        let b = Shape::cuboid(Vec3::new(2.0, 0.5, 0.5)).unwrap();
        // long side turned onto Y
        let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_z(FRAC_PI_2));
        let hit = intersect_shape(&down_from(0.0, 5.0, 0.0), &b, &pose).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Y).length() < 1e-5);

        let side = Ray::new(Vec3::new(5.0, 0.0, 0.0), -Vec3::X);
        let hit = intersect_shape(&side, &b, &pose).unwrap();
        assert!((hit.distance - 4.5).abs() < 1e-5);
        assert!((hit.normal - Vec3::X).length() < 1e-5);

        assert!(intersect_shape(&down_from(0.7, 5.0, 0.0), &b, &pose).is_none());
    }

    #[test]
    fn test_ellipsoid_hit() {
        let e = Shape::ellipsoid(Vec3::new(2.0, 1.0, 1.0)).unwrap();
        let side = Ray::new(Vec3::new(5.0, 0.0, 0.0), -Vec3::X);
        let hit = intersect_shape(&side, &e, &Pose::IDENTITY).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::X).length() < 1e-5);

        let top = intersect_shape(&down_from(0.0, 5.0, 0.0), &e, &Pose::IDENTITY).unwrap();
        assert!((top.distance - 4.0).abs() < 1e-5);

        // outside the ellipsoid but inside its bounding box
        assert!(intersect_shape(&down_from(1.9, 5.0, 0.9), &e, &Pose::IDENTITY).is_none());
    }

    #[test]
    fn test_heightfield_hit() {
        let hf = Shape::heightfield(vec![vec![0.5; 4]; 4], 1.0).unwrap();
        let hit = intersect_shape(&down_from(1.3, 4.0, 1.6), &hf, &Pose::IDENTITY).unwrap();
        assert!((hit.distance - 3.5).abs() < 1e-4);
        assert!((hit.normal - Vec3::Y).length() < 1e-4);

        // off the grid
        assert!(intersect_shape(&down_from(-2.0, 4.0, 1.0), &hf, &Pose::IDENTITY).is_none());
    }

    #[test]
    fn test_compound_nearest_child() {
        use crate::shape::CompoundChild;
        use std::sync::Arc;
        let child = Arc::new(Shape::sphere(0.5).unwrap());
        let compound = Shape::compound(vec![
            CompoundChild { shape: child.clone(), pose: Pose::from_position(Vec3::new(0.0, -2.0, 0.0)) },
            CompoundChild { shape: child, pose: Pose::from_position(Vec3::new(0.0, 2.0, 0.0)) },
        ])
        .unwrap();
        let hit = intersect_shape(&down_from(0.0, 5.0, 0.0), &compound, &Pose::IDENTITY).unwrap();
        assert!((hit.distance - 2.5).abs() < 1e-5);
        assert!(intersect_shape(&down_from(0.0, 5.0, 0.0), &Shape::Particle, &Pose::IDENTITY).is_none());
    }

    #[test]
    fn test_zero_direction_hits_nothing() {
        let ray = Ray::new(Vec3::ZERO, Vec3::ZERO);
        assert!(!ray.is_valid());
        assert!(intersect_shape(&ray, &Shape::sphere(1.0).unwrap(), &Pose::IDENTITY).is_none());
    }
}
