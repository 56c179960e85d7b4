//! Separating-axis search and face clipping for convex polyhedra.

use glam::Vec3;

use crate::error::GeometryError;
use crate::math::Pose;
use crate::shape::ConvexPolyhedron;

/// Cross products shorter than this (squared) come from near-parallel edges.
const PARALLEL_EDGE_EPSILON_SQ: f32 = 1e-6;

/// Outcome of a separating-axis search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeparatingAxis {
    /// `axis` is the first world-space candidate on which the projections are disjoint.
    Separated { axis: Vec3 },
    /// `axis` points from A toward B; `depth` is the overlap along it.
    Penetrating { axis: Vec3, depth: f32 },
}

/// A clipped point on B's incident face and its signed distance to A's reference face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPoint {
    pub point: Vec3,
    pub distance: f32,
}

/// Ping-pong polygon buffers reused across clip calls.
#[derive(Debug, Clone, Default)]
pub struct ClipScratch {
    input: Vec<Vec3>,
    output: Vec<Vec3>,
}

impl ClipScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Find the axis of minimum penetration between two posed hulls.
///
/// Candidate axes are tested in a fixed order: A's face normals, B's face
/// normals, then the cross products of each hull's unique edges. The first
/// disjoint projection ends the search. Ties keep the earliest axis.
pub fn find_separating_axis(
    hull_a: &ConvexPolyhedron,
    pose_a: &Pose,
    hull_b: &ConvexPolyhedron,
    pose_b: &Pose,
) -> Result<SeparatingAxis, GeometryError> {
    if hull_a.faces().is_empty() || hull_b.faces().is_empty() {
        return Err(GeometryError::DegenerateHull);
    }

    let mut best: Option<(Vec3, f32)> = None;
    let mut test = |axis: Vec3| -> bool {
        match overlap_on_axis(hull_a, pose_a, hull_b, pose_b, axis) {
            None => false,
            Some(depth) => {
                match best {
                    Some((_, d)) if d <= depth => {}
                    _ => best = Some((axis, depth)),
                }
                true
            }
        }
    };

    for normal in hull_a.face_normals() {
        let axis = pose_a.transform_vector(*normal);
        if !test(axis) {
            return Ok(SeparatingAxis::Separated { axis });
        }
    }
    for normal in hull_b.face_normals() {
        let axis = pose_b.transform_vector(*normal);
        if !test(axis) {
            return Ok(SeparatingAxis::Separated { axis });
        }
    }
    for edge_a in hull_a.unique_edges() {
        let world_a = pose_a.transform_vector(*edge_a);
        for edge_b in hull_b.unique_edges() {
            let cross = world_a.cross(pose_b.transform_vector(*edge_b));
            if cross.length_squared() < PARALLEL_EDGE_EPSILON_SQ {
                continue;
            }
            let axis = cross.normalize();
            if !test(axis) {
                return Ok(SeparatingAxis::Separated { axis });
            }
        }
    }

    let Some((mut axis, depth)) = best else {
        return Err(GeometryError::DegenerateHull);
    };
    if (pose_b.position - pose_a.position).dot(axis) < 0.0 {
        axis = -axis;
    }
    Ok(SeparatingAxis::Penetrating { axis, depth })
}

/// Overlap of the two projections on `axis`, or `None` if they are disjoint.
fn overlap_on_axis(
    hull_a: &ConvexPolyhedron,
    pose_a: &Pose,
    hull_b: &ConvexPolyhedron,
    pose_b: &Pose,
    axis: Vec3,
) -> Option<f32> {
    let (min_a, max_a) = hull_a.project(pose_a, axis);
    let (min_b, max_b) = hull_b.project(pose_b, axis);
    if max_a < min_b || max_b < min_a {
        return None;
    }
    Some((max_a - min_b).min(max_b - min_a))
}

/// Clip B's incident face against A's reference face and its side planes.
///
/// `axis` must point from A toward B. Surviving points are appended to `out`
/// with their distance to the reference plane clamped to at least `min_dist`;
/// points farther than `max_dist` above the plane are dropped.
#[allow(clippy::too_many_arguments)]
pub fn clip_against_hull(
    hull_a: &ConvexPolyhedron,
    pose_a: &Pose,
    hull_b: &ConvexPolyhedron,
    pose_b: &Pose,
    axis: Vec3,
    min_dist: f32,
    max_dist: f32,
    scratch: &mut ClipScratch,
    out: &mut Vec<ClipPoint>,
) -> Result<(), GeometryError> {
    let incident = hull_b
        .face_normals()
        .iter()
        .enumerate()
        .min_by(|(_, n1), (_, n2)| {
            let d1 = pose_b.transform_vector(**n1).dot(axis);
            let d2 = pose_b.transform_vector(**n2).dot(axis);
            d1.total_cmp(&d2)
        })
        .map(|(i, _)| i)
        .ok_or(GeometryError::DegenerateHull)?;

    scratch.input.clear();
    scratch.input.extend(
        hull_b.faces()[incident]
            .iter()
            .map(|&v| pose_b.transform_point(hull_b.vertices()[v])),
    );
    clip_face_against_hull(hull_a, pose_a, axis, min_dist, max_dist, scratch, out)
}

/// Clip the world-space polygon held in `scratch` against hull A.
pub fn clip_face_against_hull(
    hull_a: &ConvexPolyhedron,
    pose_a: &Pose,
    axis: Vec3,
    min_dist: f32,
    max_dist: f32,
    scratch: &mut ClipScratch,
    out: &mut Vec<ClipPoint>,
) -> Result<(), GeometryError> {
    let reference = hull_a
        .face_normals()
        .iter()
        .enumerate()
        .max_by(|(_, n1), (_, n2)| {
            let d1 = pose_a.transform_vector(**n1).dot(axis);
            let d2 = pose_a.transform_vector(**n2).dot(axis);
            d1.total_cmp(&d2)
        })
        .map(|(i, _)| i)
        .ok_or(GeometryError::NoReferenceFace)?;

    let polygon = &hull_a.faces()[reference];
    let ref_normal = pose_a.transform_vector(hull_a.face_normals()[reference]);
    let ref_point = pose_a.transform_point(hull_a.vertices()[polygon[0]]);
    let ref_constant = -ref_normal.dot(ref_point);

    for edge in 0..polygon.len() {
        if scratch.input.is_empty() {
            break;
        }
        let wa = pose_a.transform_point(hull_a.vertices()[polygon[edge]]);
        let (normal, constant) = match hull_a.adjacent_face(reference, edge) {
            Some(face) => {
                let n = pose_a.transform_vector(hull_a.face_normals()[face]);
                (n, -n.dot(wa))
            }
            None => {
                let wb = pose_a.transform_point(hull_a.vertices()[polygon[(edge + 1) % polygon.len()]]);
                let n = (wb - wa).cross(ref_normal).normalize_or_zero();
                (n, -n.dot(wa))
            }
        };
        clip_face_against_plane(&scratch.input, normal, constant, &mut scratch.output);
        std::mem::swap(&mut scratch.input, &mut scratch.output);
    }

    for &point in &scratch.input {
        let distance = (ref_normal.dot(point) + ref_constant).max(min_dist);
        if distance <= max_dist {
            out.push(ClipPoint { point, distance });
        }
    }
    Ok(())
}

/// Keep the part of `polygon` on the non-positive side of `n . p + c = 0`.
pub fn clip_face_against_plane(polygon: &[Vec3], normal: Vec3, constant: f32, out: &mut Vec<Vec3>) {
    out.clear();
    let Some(&last) = polygon.last() else {
        return;
    };
    let mut prev = last;
    let mut prev_dist = normal.dot(prev) + constant;
    for &current in polygon {
        let dist = normal.dot(current) + constant;
        match (prev_dist <= 0.0, dist <= 0.0) {
            (true, true) => out.push(current),
            (true, false) => {
                // a point exactly on the plane was already kept
                if prev_dist < 0.0 {
                    out.push(prev.lerp(current, prev_dist / (prev_dist - dist)));
                }
            }
            (false, true) => {
                if dist < 0.0 {
                    out.push(prev.lerp(current, prev_dist / (prev_dist - dist)));
                }
                out.push(current);
            }
            (false, false) => {}
        }
        prev = current;
        prev_dist = dist;
    }
}
