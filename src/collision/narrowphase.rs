//! Narrow-phase contact generation for posed shape pairs.
//!
//! Pairs are ordered by [`ShapeKind`](crate::shape::ShapeKind) before dispatch, so each routine only
//! handles one ordering. Contacts produced for a swapped pair are flipped
//! back so normals always point from the first shape to the second.

use glam::{Quat, Vec3};

use super::contact::ContactPoint;
use super::sat::{self, ClipPoint, ClipScratch, SeparatingAxis};
use crate::error::GeometryError;
use crate::math::Pose;
use crate::shape::{Aabb, ConvexPolyhedron, Heightfield, Shape};

/// Rotations within this of identity count as axis-aligned for the box early-out.
const AXIS_ALIGNED_EPSILON: f32 = 1e-6;

/// Generates contact points between shapes, owning the clipping buffers.
#[derive(Debug, Clone)]
pub struct ContactGenerator {
    scratch: ClipScratch,
    clipped: Vec<ClipPoint>,
    /// Clipped points deeper than this are clamped to it.
    pub min_clip_distance: f32,
    /// Clipped points above the reference face by more than this are dropped.
    pub max_clip_distance: f32,
}

impl Default for ContactGenerator {
    fn default() -> Self {
        Self {
            scratch: ClipScratch::new(),
            clipped: Vec::new(),
            min_clip_distance: -100.0,
            max_clip_distance: 0.0,
        }
    }
}

impl ContactGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the contacts between two posed shapes to `out`.
    ///
    /// On error, `out` may hold a partial result for this pair; callers
    /// discard it.
    pub fn generate(
        &mut self,
        shape_a: &Shape,
        pose_a: &Pose,
        shape_b: &Shape,
        pose_b: &Pose,
        out: &mut Vec<ContactPoint>,
    ) -> Result<(), GeometryError> {
        if let Shape::Compound(children) = shape_a {
            for child in children {
                self.generate(&child.shape, &pose_a.compose(&child.pose), shape_b, pose_b, out)?;
            }
            return Ok(());
        }
        if let Shape::Compound(children) = shape_b {
            for child in children {
                self.generate(shape_a, pose_a, &child.shape, &pose_b.compose(&child.pose), out)?;
            }
            return Ok(());
        }

        if shape_a.kind() <= shape_b.kind() {
            self.leaf(shape_a, pose_a, shape_b, pose_b, out)
        } else {
            let start = out.len();
            self.leaf(shape_b, pose_b, shape_a, pose_a, out)?;
            flip(&mut out[start..]);
            Ok(())
        }
    }

    /// Dispatch a canonical pair: `shape_a.kind() <= shape_b.kind()`, no compounds.
    fn leaf(
        &mut self,
        shape_a: &Shape,
        pose_a: &Pose,
        shape_b: &Shape,
        pose_b: &Pose,
        out: &mut Vec<ContactPoint>,
    ) -> Result<(), GeometryError> {
        match (shape_a, shape_b) {
            (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
                out.extend(sphere_sphere(pose_a.position, *ra, pose_b.position, *rb));
            }
            (Shape::Sphere { radius }, Shape::Plane) => {
                out.extend(sphere_plane(pose_a.position, *radius, pose_b));
            }
            (Shape::Sphere { radius }, Shape::Box(cuboid)) => {
                out.extend(sphere_box(pose_a.position, *radius, cuboid.half_extents(), pose_b));
            }
            (Shape::Sphere { radius }, Shape::ConvexPolyhedron(hull)) => {
                out.extend(sphere_convex(pose_a.position, *radius, hull, pose_b));
            }
            (Shape::Sphere { radius }, Shape::Particle) => {
                out.extend(sphere_particle(pose_a.position, *radius, pose_b.position));
            }
            (Shape::Plane, Shape::Box(_) | Shape::ConvexPolyhedron(_)) => {
                if let Some(hull) = shape_b.hull() {
                    plane_hull(pose_a, hull, pose_b, out);
                }
            }
            (Shape::Plane, Shape::Particle) => {
                out.extend(plane_particle(pose_a, pose_b.position));
            }
            (Shape::Box(a), Shape::Box(b)) => {
                if axis_aligned(pose_a.rotation) && axis_aligned(pose_b.rotation) {
                    let aabb_a = Aabb::from_center_half_extents(pose_a.position, a.half_extents());
                    let aabb_b = Aabb::from_center_half_extents(pose_b.position, b.half_extents());
                    if !aabb_a.overlaps(&aabb_b) {
                        return Ok(());
                    }
                }
                self.hull_hull(a.hull(), pose_a, b.hull(), pose_b, out)?;
            }
            (
                Shape::Box(_) | Shape::ConvexPolyhedron(_),
                Shape::Box(_) | Shape::ConvexPolyhedron(_),
            ) => {
                if let (Some(a), Some(b)) = (shape_a.hull(), shape_b.hull()) {
                    self.hull_hull(a, pose_a, b, pose_b, out)?;
                }
            }
            (Shape::Box(_) | Shape::ConvexPolyhedron(_), Shape::Particle) => {
                if let Some(hull) = shape_a.hull() {
                    out.extend(hull_particle(hull, pose_a, pose_b.position));
                }
            }
            (
                Shape::Sphere { .. } | Shape::Box(_) | Shape::ConvexPolyhedron(_),
                Shape::Heightfield(hf),
            ) => {
                self.heightfield(shape_a, pose_a, hf, pose_b, out)?;
            }
            (Shape::Heightfield(hf), Shape::Particle) => {
                let start = out.len();
                self.heightfield(shape_b, pose_b, hf, pose_a, out)?;
                flip(&mut out[start..]);
            }
            (Shape::Sphere { radius }, Shape::Ellipsoid { radii }) => {
                out.extend(sphere_ellipsoid(pose_a.position, *radius, *radii, pose_b));
            }
            (Shape::Plane, Shape::Ellipsoid { radii }) => {
                out.extend(plane_ellipsoid(pose_a, *radii, pose_b));
            }
            (Shape::Particle, Shape::Ellipsoid { radii }) => {
                out.extend(particle_ellipsoid(pose_a.position, *radii, pose_b));
            }
            // plane-plane, plane-heightfield, heightfield-heightfield, particle-particle,
            // and ellipsoids against hulls, heightfields and other ellipsoids
            _ => {}
        }
        Ok(())
    }

    /// SAT followed by clipping B's incident face against A.
    fn hull_hull(
        &mut self,
        hull_a: &ConvexPolyhedron,
        pose_a: &Pose,
        hull_b: &ConvexPolyhedron,
        pose_b: &Pose,
        out: &mut Vec<ContactPoint>,
    ) -> Result<(), GeometryError> {
        let (axis, depth) = match sat::find_separating_axis(hull_a, pose_a, hull_b, pose_b)? {
            SeparatingAxis::Separated { .. } => return Ok(()),
            SeparatingAxis::Penetrating { axis, depth } => (axis, depth),
        };

        self.clipped.clear();
        sat::clip_against_hull(
            hull_a,
            pose_a,
            hull_b,
            pose_b,
            axis,
            self.min_clip_distance,
            self.max_clip_distance,
            &mut self.scratch,
            &mut self.clipped,
        )?;

        if self.clipped.is_empty() {
            // clipping lost every point; fall back to B's deepest vertex
            let local = hull_b.support_min(pose_b.inverse_transform_vector(axis));
            let vertex = pose_b.transform_point(local);
            out.push(ContactPoint::new(vertex + axis * (depth * 0.5), axis, depth));
            return Ok(());
        }

        out.extend(self.clipped.iter().map(|c| {
            let depth = -c.distance;
            ContactPoint::new(c.point + axis * (depth * 0.5), axis, depth)
        }));
        Ok(())
    }

    /// Collide `other` with the cell prisms under it. Normals point from `other`
    /// toward the heightfield.
    fn heightfield(
        &mut self,
        other: &Shape,
        other_pose: &Pose,
        hf: &Heightfield,
        hf_pose: &Pose,
        out: &mut Vec<ContactPoint>,
    ) -> Result<(), GeometryError> {
        let center = hf_pose.inverse_transform_point(other_pose.position);
        let Some((xs, zs)) = hf.cells_under(center, other.bounding_radius()) else {
            return Ok(());
        };

        for xi in xs {
            for zi in zs.clone() {
                let prisms = match hf.cell_prisms(xi, zi) {
                    Ok(prisms) => prisms,
                    Err(err) => {
                        tracing::debug!(xi, zi, %err, "skipping heightfield cell");
                        continue;
                    }
                };
                for prism in &prisms {
                    match other {
                        Shape::Sphere { radius } => {
                            out.extend(sphere_convex(other_pose.position, *radius, prism, hf_pose));
                        }
                        Shape::Box(cuboid) => {
                            self.hull_hull(cuboid.hull(), other_pose, prism, hf_pose, out)?;
                        }
                        Shape::ConvexPolyhedron(hull) => {
                            self.hull_hull(hull, other_pose, prism, hf_pose, out)?;
                        }
                        Shape::Particle => {
                            out.extend(hull_particle(prism, hf_pose, other_pose.position).map(ContactPoint::flipped));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }
}

fn flip(contacts: &mut [ContactPoint]) {
    for c in contacts {
        *c = c.flipped();
    }
}

fn axis_aligned(rotation: Quat) -> bool {
    rotation.abs_diff_eq(Quat::IDENTITY, AXIS_ALIGNED_EPSILON)
        || rotation.abs_diff_eq(-Quat::IDENTITY, AXIS_ALIGNED_EPSILON)
}

/// Specialized sphere-sphere intersection test.
pub fn sphere_sphere(center_a: Vec3, radius_a: f32, center_b: Vec3, radius_b: f32) -> Option<ContactPoint> {
    let diff = center_b - center_a;
    let dist_sq = diff.length_squared();
    let min_dist = radius_a + radius_b;

    if dist_sq >= min_dist * min_dist {
        return None;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 { diff / dist } else { Vec3::Y };

    let depth = min_dist - dist;
    let point = center_a + normal * (radius_a - depth * 0.5);
    Some(ContactPoint::new(point, normal, depth))
}

/// Sphere against the +Y half-space boundary of a posed plane.
pub fn sphere_plane(center: Vec3, radius: f32, plane: &Pose) -> Option<ContactPoint> {
    let n = plane.transform_vector(Vec3::Y);
    let d = n.dot(center - plane.position);
    if d >= radius {
        return None;
    }
    Some(ContactPoint::new(center - n * ((radius + d) * 0.5), -n, radius - d))
}

/// Sphere against an oriented box.
///
/// The sphere center is clamped into the box to find the closest point. A
/// center inside the box is pushed out through the face of least penetration.
pub fn sphere_box(center: Vec3, radius: f32, half_extents: Vec3, pose: &Pose) -> Option<ContactPoint> {
    let local = pose.inverse_transform_point(center);
    let closest = local.clamp(-half_extents, half_extents);
    let to_sphere = local - closest;
    let dist_sq = to_sphere.length_squared();

    if dist_sq >= radius * radius {
        return None;
    }

    let dist = dist_sq.sqrt();
    if dist < 1e-6 {
        // Center inside: find the face of least penetration.
        let mut min_pen = f32::MAX;
        let mut normal = Vec3::Y;
        for (i, axis) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
            let pen_pos = half_extents[i] - local[i];
            let pen_neg = half_extents[i] + local[i];
            if pen_pos < min_pen {
                min_pen = pen_pos;
                normal = axis;
            }
            if pen_neg < min_pen {
                min_pen = pen_neg;
                normal = -axis;
            }
        }
        let box_to_sphere = pose.transform_vector(normal);
        let point = center + box_to_sphere * ((min_pen - radius) * 0.5);
        return Some(ContactPoint::new(point, -box_to_sphere, min_pen + radius));
    }

    let box_to_sphere = pose.transform_vector(to_sphere / dist);
    let surface = pose.transform_point(closest);
    let point = (surface + center - box_to_sphere * radius) * 0.5;
    Some(ContactPoint::new(point, -box_to_sphere, radius - dist))
}

/// Sphere against a posed convex hull, using the closest feature of the hull.
pub fn sphere_convex(center: Vec3, radius: f32, hull: &ConvexPolyhedron, pose: &Pose) -> Option<ContactPoint> {
    let local = pose.inverse_transform_point(center);

    let mut max_dist = f32::NEG_INFINITY;
    let mut max_face = 0;
    for (face, normal) in hull.face_normals().iter().enumerate() {
        let d = normal.dot(local) + hull.face_constant(face);
        if d >= radius {
            return None;
        }
        if d > max_dist {
            max_dist = d;
            max_face = face;
        }
    }

    if max_dist > 0.0 {
        let mut best: Option<(Vec3, f32)> = None;
        for (face, normal) in hull.face_normals().iter().enumerate() {
            let d = normal.dot(local) + hull.face_constant(face);
            if d <= 0.0 {
                continue;
            }
            let candidate = closest_on_face(hull, face, local - *normal * d);
            let dist_sq = (local - candidate).length_squared();
            match best {
                Some((_, b)) if b <= dist_sq => {}
                _ => best = Some((candidate, dist_sq)),
            }
        }
        if let Some((closest, dist_sq)) = best {
            if dist_sq >= radius * radius {
                return None;
            }
            let dist = dist_sq.sqrt();
            if dist > 1e-6 {
                let hull_to_sphere = pose.transform_vector((local - closest) / dist);
                let surface = pose.transform_point(closest);
                let point = (surface + center - hull_to_sphere * radius) * 0.5;
                return Some(ContactPoint::new(point, -hull_to_sphere, radius - dist));
            }
        }
    }

    // Center inside (or on) the hull: exit through the nearest face plane.
    let hull_to_sphere = pose.transform_vector(hull.face_normals()[max_face]);
    let point = center - hull_to_sphere * ((radius + max_dist) * 0.5);
    Some(ContactPoint::new(point, -hull_to_sphere, radius - max_dist))
}

/// Closest point of a face polygon to `projected`, a point on the face plane.
fn closest_on_face(hull: &ConvexPolyhedron, face: usize, projected: Vec3) -> Vec3 {
    if hull.face_contains(face, projected) {
        return projected;
    }
    let polygon = &hull.faces()[face];
    let vertices = hull.vertices();
    let mut best = vertices[polygon[0]];
    let mut best_sq = f32::INFINITY;
    for k in 0..polygon.len() {
        let a = vertices[polygon[k]];
        let b = vertices[polygon[(k + 1) % polygon.len()]];
        let ab = b - a;
        let t = if ab.length_squared() > 0.0 {
            ((projected - a).dot(ab) / ab.length_squared()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let p = a + ab * t;
        let d = (projected - p).length_squared();
        if d < best_sq {
            best_sq = d;
            best = p;
        }
    }
    best
}

pub fn sphere_particle(center: Vec3, radius: f32, point: Vec3) -> Option<ContactPoint> {
    let diff = point - center;
    let dist_sq = diff.length_squared();
    if dist_sq >= radius * radius {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 { diff / dist } else { Vec3::Y };
    Some(ContactPoint::new(center + normal * ((radius + dist) * 0.5), normal, radius - dist))
}

/// Every hull vertex below the plane becomes a contact.
pub fn plane_hull(plane: &Pose, hull: &ConvexPolyhedron, pose: &Pose, out: &mut Vec<ContactPoint>) {
    let n = plane.transform_vector(Vec3::Y);
    for v in hull.vertices() {
        let world = pose.transform_point(*v);
        let d = n.dot(world - plane.position);
        if d < 0.0 {
            out.push(ContactPoint::new(world - n * (d * 0.5), n, -d));
        }
    }
}

pub fn plane_particle(plane: &Pose, point: Vec3) -> Option<ContactPoint> {
    let n = plane.transform_vector(Vec3::Y);
    let d = n.dot(point - plane.position);
    if d >= 0.0 {
        return None;
    }
    Some(ContactPoint::new(point - n * (d * 0.5), n, -d))
}

/// A point inside a hull is pushed out through the nearest face.
pub fn hull_particle(hull: &ConvexPolyhedron, pose: &Pose, point: Vec3) -> Option<ContactPoint> {
    let local = pose.inverse_transform_point(point);
    let (face, d) = hull
        .face_normals()
        .iter()
        .enumerate()
        .map(|(face, n)| (face, n.dot(local) + hull.face_constant(face)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    if d > 0.0 {
        return None;
    }
    let n = pose.transform_vector(hull.face_normals()[face]);
    Some(ContactPoint::new(point + n * (-d * 0.5), n, -d))
}

/// Bisection steps for the closest point on an ellipsoid.
const ELLIPSOID_ITERATIONS: usize = 48;

/// Closest surface point of an origin-centered ellipsoid to a local point
/// outside it.
///
/// The closest point is `r²∘p / (t + r²)` for the root `t > 0` of
/// `Σ (rᵢ pᵢ / (t + rᵢ²))² = 1`, found by bisection.
fn ellipsoid_closest_outside(radii: Vec3, p: Vec3) -> Vec3 {
    let sq = radii * radii;
    let excess = |t: f32| ((radii * p) / (Vec3::splat(t) + sq)).length_squared() - 1.0;
    let mut lo = 0.0;
    let mut hi = radii.max_element() * p.length();
    for _ in 0..ELLIPSOID_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if excess(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    sq * p / (Vec3::splat(0.5 * (lo + hi)) + sq)
}

/// Surface point along the ray from the center through `p`, with the outward
/// normal there. A point at the center exits through +Y.
fn ellipsoid_radial(radii: Vec3, p: Vec3) -> (Vec3, Vec3) {
    let scale = (p / radii).length();
    let surface = if scale > 1e-6 {
        p / scale
    } else {
        Vec3::new(0.0, radii.y, 0.0)
    };
    (surface, (surface / (radii * radii)).normalize_or(Vec3::Y))
}

/// Sphere against a posed ellipsoid.
pub fn sphere_ellipsoid(center: Vec3, radius: f32, radii: Vec3, pose: &Pose) -> Option<ContactPoint> {
    let local = pose.inverse_transform_point(center);
    if (local / radii).length_squared() > 1.0 {
        let closest = ellipsoid_closest_outside(radii, local);
        let offset = local - closest;
        let dist = offset.length();
        if dist >= radius {
            return None;
        }
        let outward = if dist > 1e-6 {
            offset / dist
        } else {
            (closest / (radii * radii)).normalize_or(Vec3::Y)
        };
        let to_sphere = pose.transform_vector(outward);
        let surface = pose.transform_point(closest);
        let point = (surface + center - to_sphere * radius) * 0.5;
        return Some(ContactPoint::new(point, -to_sphere, radius - dist));
    }

    // Center inside: exit radially.
    let (surface, outward) = ellipsoid_radial(radii, local);
    let depth = radius + (surface - local).dot(outward);
    let to_sphere = pose.transform_vector(outward);
    let point = (pose.transform_point(surface) + center - to_sphere * radius) * 0.5;
    Some(ContactPoint::new(point, -to_sphere, depth))
}

/// The ellipsoid's support point along the plane's inward normal.
pub fn plane_ellipsoid(plane: &Pose, radii: Vec3, pose: &Pose) -> Option<ContactPoint> {
    let n = plane.transform_vector(Vec3::Y);
    let dir = pose.inverse_transform_vector(-n);
    let scaled = radii * dir;
    let support = radii * scaled / scaled.length();
    let world = pose.transform_point(support);
    let d = n.dot(world - plane.position);
    if d >= 0.0 {
        return None;
    }
    Some(ContactPoint::new(world - n * (d * 0.5), n, -d))
}

/// A point inside an ellipsoid is pushed out radially. The normal points from
/// the particle toward the ellipsoid.
pub fn particle_ellipsoid(point: Vec3, radii: Vec3, pose: &Pose) -> Option<ContactPoint> {
    let local = pose.inverse_transform_point(point);
    if (local / radii).length_squared() >= 1.0 {
        return None;
    }
    let (surface, outward) = ellipsoid_radial(radii, local);
    let depth = (surface - local).dot(outward);
    let n = pose.transform_vector(outward);
    Some(ContactPoint::new(point + n * (depth * 0.5), -n, depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::CompoundChild;
    use std::sync::Arc;

    fn generate(a: &Shape, pa: Pose, b: &Shape, pb: Pose) -> Vec<ContactPoint> {
        let mut generator = ContactGenerator::new();
        let mut out = Vec::new();
        generator.generate(a, &pa, b, &pb, &mut out).unwrap();
        out
    }

    fn at(x: f32, y: f32, z: f32) -> Pose {
        Pose::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn test_sphere_sphere() {
        let s = Shape::sphere(1.0).unwrap();
        let contacts = generate(&s, at(0.0, 0.0, 0.0), &s, at(1.5, 0.0, 0.0));
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.5).abs() < 1e-6);
        assert!((contacts[0].normal - Vec3::X).length() < 1e-6);
        assert!((contacts[0].position - Vec3::new(0.75, 0.0, 0.0)).length() < 1e-6);

        assert!(generate(&s, at(0.0, 0.0, 0.0), &s, at(2.5, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_coincident_spheres_use_up_normal() {
        let s = Shape::sphere(0.5).unwrap();
        let contacts = generate(&s, at(1.0, 1.0, 1.0), &s, at(1.0, 1.0, 1.0));
        assert_eq!(contacts[0].normal, Vec3::Y);
        assert!((contacts[0].depth - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_plane_both_orders() {
        let s = Shape::sphere(1.0).unwrap();
        let contacts = generate(&s, at(0.0, 0.8, 0.0), &Shape::Plane, Pose::IDENTITY);
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.2).abs() < 1e-6);
        assert!((contacts[0].normal + Vec3::Y).length() < 1e-6);
        assert!((contacts[0].position.y + 0.1).abs() < 1e-6);

        let swapped = generate(&Shape::Plane, Pose::IDENTITY, &s, at(0.0, 0.8, 0.0));
        assert!((swapped[0].normal - Vec3::Y).length() < 1e-6);
        assert!((swapped[0].depth - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_box_face_and_inside() {
        let s = Shape::sphere(0.5).unwrap();
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        let contacts = generate(&s, at(0.0, 1.4, 0.0), &b, Pose::IDENTITY);
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.1).abs() < 1e-5);
        assert!((contacts[0].normal + Vec3::Y).length() < 1e-5);

        // center inside, nearest face is +X
        let inside = generate(&s, at(0.8, 0.0, 0.0), &b, Pose::IDENTITY);
        assert!((inside[0].normal + Vec3::X).length() < 1e-5);
        assert!((inside[0].depth - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_box_corner_miss() {
        let s = Shape::sphere(0.5).unwrap();
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        // within 0.5 of every face plane but more than 0.5 from the corner
        assert!(generate(&s, at(1.4, 1.4, 1.4), &b, Pose::IDENTITY).is_empty());
    }

    #[test]
    fn test_sphere_convex_matches_sphere_box() {
        let s = Shape::sphere(0.5).unwrap();
        let hull = Shape::convex(
            ConvexPolyhedron::cuboid(Vec3::ONE).unwrap().vertices().to_vec(),
            ConvexPolyhedron::cuboid(Vec3::ONE).unwrap().faces().to_vec(),
        )
        .unwrap();
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        let pose = Pose::new(Vec3::new(0.2, -0.3, 0.0), Quat::from_rotation_y(0.4));
        for center in [at(0.0, 1.3, 0.0), at(1.2, 1.2, 0.0), at(0.3, 0.1, 0.0)] {
            let from_hull = generate(&s, center, &hull, pose);
            let from_box = generate(&s, center, &b, pose);
            assert_eq!(from_hull.len(), from_box.len());
            for (h, b) in from_hull.iter().zip(&from_box) {
                assert!((h.depth - b.depth).abs() < 1e-4, "{h:?} vs {b:?}");
                assert!((h.normal - b.normal).length() < 1e-4);
                assert!((h.position - b.position).length() < 1e-4);
            }
        }
    }

    #[test]
    fn test_box_resting_on_box() {
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        let contacts = generate(&b, Pose::IDENTITY, &b, at(0.0, 1.95, 0.0));
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert!((c.depth - 0.05).abs() < 1e-5);
            assert!((c.normal - Vec3::Y).length() < 1e-5);
            assert!((c.position.y - 0.975).abs() < 1e-5);
        }
    }

    #[test]
    fn test_axis_aligned_boxes_early_out() {
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        assert!(generate(&b, Pose::IDENTITY, &b, at(0.0, 2.5, 0.0)).is_empty());
    }

    #[test]
    fn test_box_on_plane_four_corners() {
        let b = Shape::cuboid(Vec3::splat(0.5)).unwrap();
        let contacts = generate(&b, at(0.0, 0.45, 0.0), &Shape::Plane, Pose::IDENTITY);
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            // flipped: box (A) toward plane (B)
            assert!((c.normal + Vec3::Y).length() < 1e-6);
            assert!((c.depth - 0.05).abs() < 1e-5);
        }
    }

    #[test]
    fn test_tilted_plane() {
        let s = Shape::sphere(1.0).unwrap();
        let plane = Pose::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        // plane normal is now -X
        let contacts = generate(&Shape::Plane, plane, &s, at(-0.5, 0.0, 0.0));
        assert!((contacts[0].normal + Vec3::X).length() < 1e-5);
        assert!((contacts[0].depth - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_particles() {
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        let contacts = generate(&Shape::Particle, at(0.0, 0.9, 0.0), &b, Pose::IDENTITY);
        assert_eq!(contacts.len(), 1);
        // particle (A) is pushed up, so the normal toward the box is -Y
        assert!((contacts[0].normal + Vec3::Y).length() < 1e-5);
        assert!((contacts[0].depth - 0.1).abs() < 1e-5);

        assert!(generate(&Shape::Particle, at(0.0, 1.1, 0.0), &b, Pose::IDENTITY).is_empty());
        assert_eq!(generate(&Shape::Plane, Pose::IDENTITY, &Shape::Particle, at(0.0, -0.1, 0.0)).len(), 1);
        assert!(generate(&Shape::Particle, at(0.0, 0.0, 0.0), &Shape::Particle, at(0.0, 0.0, 0.0)).is_empty());

        let s = Shape::sphere(1.0).unwrap();
        let c = generate(&s, Pose::IDENTITY, &Shape::Particle, at(0.0, 0.0, 0.5));
        assert!((c[0].normal - Vec3::Z).length() < 1e-6);
        assert!((c[0].depth - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_contact_pairs() {
        let hf = Shape::heightfield(vec![vec![0.0; 3]; 3], 1.0).unwrap();
        assert!(generate(&Shape::Plane, Pose::IDENTITY, &Shape::Plane, Pose::IDENTITY).is_empty());
        assert!(generate(&Shape::Plane, Pose::IDENTITY, &hf, Pose::IDENTITY).is_empty());
        assert!(generate(&hf, Pose::IDENTITY, &hf, Pose::IDENTITY).is_empty());
    }

    #[test]
    fn test_sphere_on_heightfield() {
        let hf = Shape::heightfield(vec![vec![0.0; 4]; 4], 1.0).unwrap();
        let s = Shape::sphere(0.5).unwrap();
        let contacts = generate(&s, at(1.3, 0.4, 1.6), &hf, Pose::IDENTITY);
        assert!(!contacts.is_empty());
        let deepest = contacts.iter().map(|c| c.depth).fold(0.0, f32::max);
        assert!((deepest - 0.1).abs() < 1e-4);
        assert!(contacts.iter().all(|c| c.normal.y < 0.0));

        assert!(generate(&s, at(1.3, 0.6, 1.6), &hf, Pose::IDENTITY).is_empty());
        // outside the grid
        assert!(generate(&s, at(-5.0, 0.0, 1.0), &hf, Pose::IDENTITY).is_empty());
    }

    #[test]
    fn test_particle_on_heightfield_order() {
        let hf = Shape::heightfield(vec![vec![1.0; 3]; 3], 1.0).unwrap();
        let contacts = generate(&hf, Pose::IDENTITY, &Shape::Particle, at(0.3, 0.9, 0.3));
        assert!(!contacts.is_empty());
        assert!(contacts.iter().all(|c| (c.normal - Vec3::Y).length() < 1e-5));
    }

    #[test]
    fn test_compound_children_are_posed() {
        let child = Arc::new(Shape::sphere(0.5).unwrap());
        let compound = Shape::compound(vec![
            CompoundChild { shape: child.clone(), pose: at(-2.0, 0.0, 0.0) },
            CompoundChild { shape: child, pose: at(2.0, 0.0, 0.0) },
        ])
        .unwrap();
        let contacts = generate(&compound, at(0.0, 0.4, 0.0), &Shape::Plane, Pose::IDENTITY);
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().all(|c| (c.depth - 0.1).abs() < 1e-5));
        let mut xs: Vec<f32> = contacts.iter().map(|c| c.position.x).collect();
        xs.sort_by(f32::total_cmp);
        assert!((xs[0] + 2.0).abs() < 1e-5 && (xs[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_ellipsoid() {
        let e = Shape::ellipsoid(Vec3::new(2.0, 1.0, 1.0)).unwrap();
        let s = Shape::sphere(0.5).unwrap();

        let side = generate(&s, at(2.4, 0.0, 0.0), &e, Pose::IDENTITY);
        assert_eq!(side.len(), 1);
        assert!((side[0].depth - 0.1).abs() < 1e-4);
        assert!((side[0].normal + Vec3::X).length() < 1e-4);
        assert!((side[0].position - Vec3::new(1.95, 0.0, 0.0)).length() < 1e-4);

        let top = generate(&e, Pose::IDENTITY, &s, at(0.0, 1.4, 0.0));
        assert!((top[0].depth - 0.1).abs() < 1e-4);
        assert!((top[0].normal - Vec3::Y).length() < 1e-4);

        assert!(generate(&s, at(3.0, 0.0, 0.0), &e, Pose::IDENTITY).is_empty());
        // inside the AABB corner but outside the ellipsoid
        assert!(generate(&s, at(2.1, 1.1, 0.0), &e, Pose::IDENTITY).is_empty());

        // long axis turned onto Y
        let turned = Pose::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let c = generate(&s, at(0.0, 2.4, 0.0), &e, turned);
        assert!((c[0].depth - 0.1).abs() < 1e-4);
        assert!((c[0].normal + Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn test_sphere_ellipsoid_off_axis_matches_sphere() {
        // A unit-radius ellipsoid is a sphere.
        let e = Shape::ellipsoid(Vec3::ONE).unwrap();
        let s = Shape::sphere(1.0).unwrap();
        let center = at(1.0, 0.8, -0.6);
        let from_ellipsoid = generate(&s, center, &e, Pose::IDENTITY);
        let from_sphere = generate(&s, center, &s, Pose::IDENTITY);
        assert_eq!(from_ellipsoid.len(), 1);
        assert!((from_ellipsoid[0].depth - from_sphere[0].depth).abs() < 1e-4);
        assert!((from_ellipsoid[0].normal - from_sphere[0].normal).length() < 1e-4);
    }

    #[test]
    fn test_sphere_center_inside_ellipsoid() {
        let e = Shape::ellipsoid(Vec3::new(2.0, 1.0, 1.0)).unwrap();
        let s = Shape::sphere(0.5).unwrap();
        let c = generate(&s, at(1.0, 0.0, 0.0), &e, Pose::IDENTITY);
        assert!((c[0].normal + Vec3::X).length() < 1e-5);
        assert!((c[0].depth - 1.5).abs() < 1e-5);

        let centered = generate(&s, Pose::IDENTITY, &e, Pose::IDENTITY);
        assert!((centered[0].normal + Vec3::Y).length() < 1e-5);
        assert!(centered[0].depth.is_finite());
    }

    #[test]
    fn test_plane_ellipsoid() {
        let e = Shape::ellipsoid(Vec3::new(1.0, 0.5, 1.0)).unwrap();
        let contacts = generate(&Shape::Plane, Pose::IDENTITY, &e, at(3.0, 0.4, 0.0));
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.1).abs() < 1e-5);
        assert!((contacts[0].normal - Vec3::Y).length() < 1e-5);
        assert!((contacts[0].position - Vec3::new(3.0, -0.05, 0.0)).length() < 1e-5);

        let swapped = generate(&e, at(0.0, 0.4, 0.0), &Shape::Plane, Pose::IDENTITY);
        assert!((swapped[0].normal + Vec3::Y).length() < 1e-5);

        assert!(generate(&Shape::Plane, Pose::IDENTITY, &e, at(0.0, 0.6, 0.0)).is_empty());

        let turned = Pose::new(Vec3::new(0.0, 0.9, 0.0), Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let c = generate(&Shape::Plane, Pose::IDENTITY, &e, turned);
        assert!((c[0].depth - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_particle_ellipsoid() {
        let e = Shape::ellipsoid(Vec3::new(2.0, 1.0, 1.0)).unwrap();
        let c = generate(&Shape::Particle, at(0.0, 0.9, 0.0), &e, Pose::IDENTITY);
        assert_eq!(c.len(), 1);
        assert!((c[0].normal + Vec3::Y).length() < 1e-5);
        assert!((c[0].depth - 0.1).abs() < 1e-5);
        assert!(generate(&Shape::Particle, at(0.0, 1.1, 0.0), &e, Pose::IDENTITY).is_empty());

        // unsupported ellipsoid pairs produce nothing
        let b = Shape::cuboid(Vec3::ONE).unwrap();
        assert!(generate(&e, Pose::IDENTITY, &b, Pose::IDENTITY).is_empty());
        assert!(generate(&e, Pose::IDENTITY, &e, Pose::IDENTITY).is_empty());
    }
}
