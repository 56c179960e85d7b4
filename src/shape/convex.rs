use glam::Vec3;

use super::Aabb;
use crate::error::ShapeError;
use crate::math::Pose;

const VERTEX_WELD_EPSILON: f32 = 1e-6;
const EDGE_DIRECTION_EPSILON: f32 = 1e-6;
const FACE_AREA_EPSILON: f32 = 1e-12;

/// Convex polyhedron with precomputed normals, unique edges, and face adjacency.
///
/// Face windings are normalized at construction so every normal points away
/// from the hull centroid, regardless of the order the caller supplied.
#[derive(Debug, Clone)]
pub struct ConvexPolyhedron {
    vertices: Vec<Vec3>,
    faces: Vec<Vec<usize>>,
    face_normals: Vec<Vec3>,
    unique_edges: Vec<Vec3>,
    // adjacency[face][edge] is the face sharing edge (face[edge], face[edge + 1])
    adjacency: Vec<Vec<Option<usize>>>,
    bounding_radius: f32,
}

impl ConvexPolyhedron {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>) -> Result<Self, ShapeError> {
        let unique = count_unique(&vertices);
        if unique < 3 || faces.len() < 3 {
            return Err(ShapeError::DegenerateHull {
                vertices: unique,
                faces: faces.len(),
            });
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(ShapeError::DegenerateHull {
                vertices: unique,
                faces: faces.len(),
            });
        }

        let centroid = vertices.iter().copied().sum::<Vec3>() / vertices.len() as f32;
        let mut faces = faces;
        let mut face_normals = Vec::with_capacity(faces.len());

        for (index, face) in faces.iter_mut().enumerate() {
            if face.len() < 3 {
                return Err(ShapeError::InvalidFace {
                    face: index,
                    reason: "fewer than 3 vertices",
                });
            }
            if face.iter().any(|&i| i >= vertices.len()) {
                return Err(ShapeError::InvalidFace {
                    face: index,
                    reason: "vertex index out of range",
                });
            }

            let mut normal = newell_normal(&vertices, face);
            if normal.length_squared() < FACE_AREA_EPSILON {
                return Err(ShapeError::InvalidFace {
                    face: index,
                    reason: "zero area",
                });
            }
            normal = normal.normalize();

            if normal.dot(vertices[face[0]] - centroid) < 0.0 {
                face.reverse();
                normal = -normal;
            }
            face_normals.push(normal);
        }

        let mut unique_edges: Vec<Vec3> = Vec::new();
        for face in &faces {
            for k in 0..face.len() {
                let a = vertices[face[k]];
                let b = vertices[face[(k + 1) % face.len()]];
                let dir = (b - a).normalize_or_zero();
                if dir == Vec3::ZERO {
                    continue;
                }
                let known = unique_edges.iter().any(|e| {
                    (*e - dir).length_squared() < EDGE_DIRECTION_EPSILON
                        || (*e + dir).length_squared() < EDGE_DIRECTION_EPSILON
                });
                if !known {
                    unique_edges.push(dir);
                }
            }
        }

        let adjacency = faces
            .iter()
            .enumerate()
            .map(|(f, face)| {
                (0..face.len())
                    .map(|k| {
                        let a = face[k];
                        let b = face[(k + 1) % face.len()];
                        faces
                            .iter()
                            .enumerate()
                            .find(|(g, other)| *g != f && shares_edge(other, a, b))
                            .map(|(g, _)| g)
                    })
                    .collect()
            })
            .collect();

        let bounding_radius = vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0f32, f32::max);

        Ok(Self {
            vertices,
            faces,
            face_normals,
            unique_edges,
            adjacency,
            bounding_radius,
        })
    }

    /// Axis-aligned box centered on the local origin.
    pub fn cuboid(half_extents: Vec3) -> Result<Self, ShapeError> {
        if !(half_extents.is_finite() && half_extents.min_element() > 0.0) {
            return Err(ShapeError::NonPositiveExtents(half_extents));
        }
        let h = half_extents;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let faces = vec![
            vec![3, 2, 1, 0], // -Z
            vec![4, 5, 6, 7], // +Z
            vec![5, 4, 0, 1], // -Y
            vec![2, 3, 7, 6], // +Y
            vec![0, 4, 7, 3], // -X
            vec![1, 2, 6, 5], // +X
        ];
        Self::new(vertices, faces)
    }

    /// Cylinder (or truncated cone) along the local Y axis.
    pub fn cylinder(
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
        segments: usize,
    ) -> Result<Self, ShapeError> {
        for r in [radius_top, radius_bottom] {
            if !(r.is_finite() && r > 0.0) {
                return Err(ShapeError::NonPositiveRadius(r));
            }
        }
        if !(height.is_finite() && height > 0.0) {
            return Err(ShapeError::NonPositiveHeight(height));
        }
        if segments < 3 {
            return Err(ShapeError::TooFewSegments(segments));
        }

        let half = height * 0.5;
        let mut vertices = Vec::with_capacity(segments * 2);
        for i in 0..segments {
            let theta = std::f32::consts::TAU * i as f32 / segments as f32;
            let (s, c) = theta.sin_cos();
            vertices.push(Vec3::new(radius_bottom * c, -half, radius_bottom * s));
            vertices.push(Vec3::new(radius_top * c, half, radius_top * s));
        }

        let mut faces = Vec::with_capacity(segments + 2);
        faces.push((0..segments).map(|i| 2 * i).collect());
        faces.push((0..segments).map(|i| 2 * i + 1).collect());
        for i in 0..segments {
            let j = (i + 1) % segments;
            faces.push(vec![2 * i, 2 * j, 2 * j + 1, 2 * i + 1]);
        }
        Self::new(vertices, faces)
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    pub fn face_normals(&self) -> &[Vec3] {
        &self.face_normals
    }

    pub fn unique_edges(&self) -> &[Vec3] {
        &self.unique_edges
    }

    /// Face sharing the given edge of `face`, if any.
    pub fn adjacent_face(&self, face: usize, edge: usize) -> Option<usize> {
        self.adjacency.get(face)?.get(edge).copied().flatten()
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// Plane constant `c` of a face so that `n . p + c = 0` on the face.
    pub fn face_constant(&self, face: usize) -> f32 {
        -self.face_normals[face].dot(self.vertices[self.faces[face][0]])
    }

    pub fn local_aabb(&self) -> Aabb {
        let (min, max) = self.vertices.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), v| (min.min(*v), max.max(*v)),
        );
        Aabb::new(min, max)
    }

    pub fn aabb(&self, pose: &Pose) -> Aabb {
        let (min, max) = self.vertices.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), v| {
                let w = pose.transform_point(*v);
                (min.min(w), max.max(w))
            },
        );
        Aabb::new(min, max)
    }

    /// Volume by fanning every face into tetrahedra around the vertex centroid.
    pub fn volume(&self) -> f32 {
        let centroid = self.vertices.iter().copied().sum::<Vec3>() / self.vertices.len() as f32;
        let mut volume = 0.0;
        for face in &self.faces {
            let a = self.vertices[face[0]] - centroid;
            for k in 1..face.len() - 1 {
                let b = self.vertices[face[k]] - centroid;
                let c = self.vertices[face[k + 1]] - centroid;
                volume += a.dot(b.cross(c)) / 6.0;
            }
        }
        volume.abs()
    }

    /// Min/max of the world-space vertices projected on `axis`.
    pub fn project(&self, pose: &Pose, axis: Vec3) -> (f32, f32) {
        let local_axis = pose.inverse_transform_vector(axis);
        let offset = pose.position.dot(axis);
        self.vertices
            .iter()
            .map(|v| v.dot(local_axis) + offset)
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
                (lo.min(d), hi.max(d))
            })
    }

    /// Local vertex with the smallest projection on `direction`.
    pub fn support_min(&self, direction: Vec3) -> Vec3 {
        self.vertices
            .iter()
            .copied()
            .min_by(|a, b| a.dot(direction).total_cmp(&b.dot(direction)))
            .unwrap_or(Vec3::ZERO)
    }

    /// Whether a local point lies inside the polygon of `face` (projected on its plane).
    pub fn face_contains(&self, face: usize, point: Vec3) -> bool {
        let polygon = &self.faces[face];
        let normal = self.face_normals[face];
        (0..polygon.len()).all(|k| {
            let a = self.vertices[polygon[k]];
            let b = self.vertices[polygon[(k + 1) % polygon.len()]];
            (b - a).cross(point - a).dot(normal) >= -1e-6
        })
    }
}

fn count_unique(vertices: &[Vec3]) -> usize {
    let mut unique: Vec<Vec3> = Vec::with_capacity(vertices.len());
    for v in vertices {
        if !unique
            .iter()
            .any(|u| (*u - *v).length_squared() < VERTEX_WELD_EPSILON * VERTEX_WELD_EPSILON)
        {
            unique.push(*v);
        }
    }
    unique.len()
}

fn newell_normal(vertices: &[Vec3], face: &[usize]) -> Vec3 {
    let mut n = Vec3::ZERO;
    for k in 0..face.len() {
        let a = vertices[face[k]];
        let b = vertices[face[(k + 1) % face.len()]];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

fn shares_edge(face: &[usize], a: usize, b: usize) -> bool {
    (0..face.len()).any(|k| {
        let p = face[k];
        let q = face[(k + 1) % face.len()];
        (p == a && q == b) || (p == b && q == a)
    })
}
