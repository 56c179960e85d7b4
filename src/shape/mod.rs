//! Collision shapes and their mass and bounds properties.
//!
//! [`Shape`] is a closed set; the contact generator dispatches on the
//! unordered [`ShapeKind`] pair of two shapes.

mod convex;
mod heightfield;

pub use convex::ConvexPolyhedron;
pub use heightfield::Heightfield;

use std::sync::Arc;

use glam::{Mat3, Vec3};

use crate::error::ShapeError;
use crate::math::Pose;

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box that overlaps nothing.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub const INFINITE: Self = Self {
        min: Vec3::splat(f32::NEG_INFINITY),
        max: Vec3::splat(f32::INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Check if two AABBs overlap (touching counts).
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Bounds of a box with the given local half-extents after rotation and translation.
    pub fn from_oriented_box(pose: &Pose, center: Vec3, half_extents: Vec3) -> Aabb {
        let rot = Mat3::from_quat(pose.rotation);
        let extent = rot.x_axis.abs() * half_extents.x
            + rot.y_axis.abs() * half_extents.y
            + rot.z_axis.abs() * half_extents.z;
        Aabb::from_center_half_extents(pose.transform_point(center), extent)
    }
}

/// Discriminant of [`Shape`], ordered for pair canonicalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeKind {
    Sphere,
    Plane,
    Box,
    ConvexPolyhedron,
    Heightfield,
    Particle,
    Ellipsoid,
    Compound,
}

/// Box with its hull cached for SAT.
#[derive(Debug, Clone)]
pub struct Cuboid {
    half_extents: Vec3,
    hull: ConvexPolyhedron,
}

impl Cuboid {
    pub fn new(half_extents: Vec3) -> Result<Self, ShapeError> {
        Ok(Self {
            half_extents,
            hull: ConvexPolyhedron::cuboid(half_extents)?,
        })
    }

    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    pub fn hull(&self) -> &ConvexPolyhedron {
        &self.hull
    }
}

/// Child of a compound shape, posed relative to the compound origin.
#[derive(Debug, Clone)]
pub struct CompoundChild {
    pub shape: Arc<Shape>,
    pub pose: Pose,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Infinite plane through the local origin with normal +Y; solid below.
    Plane,
    Box(Cuboid),
    ConvexPolyhedron(ConvexPolyhedron),
    Heightfield(Heightfield),
    Particle,
    /// Axis-aligned ellipsoid with the given semi-axes.
    Ellipsoid { radii: Vec3 },
    Compound(Vec<CompoundChild>),
}

impl Shape {
    pub fn sphere(radius: f32) -> Result<Self, ShapeError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(ShapeError::NonPositiveRadius(radius));
        }
        Ok(Shape::Sphere { radius })
    }

    pub fn ellipsoid(radii: Vec3) -> Result<Self, ShapeError> {
        if !(radii.is_finite() && radii.min_element() > 0.0) {
            return Err(ShapeError::NonPositiveExtents(radii));
        }
        Ok(Shape::Ellipsoid { radii })
    }

    pub fn cuboid(half_extents: Vec3) -> Result<Self, ShapeError> {
        Ok(Shape::Box(Cuboid::new(half_extents)?))
    }

    pub fn convex(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>) -> Result<Self, ShapeError> {
        Ok(Shape::ConvexPolyhedron(ConvexPolyhedron::new(vertices, faces)?))
    }

    pub fn cylinder(
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
        segments: usize,
    ) -> Result<Self, ShapeError> {
        Ok(Shape::ConvexPolyhedron(ConvexPolyhedron::cylinder(
            radius_top,
            radius_bottom,
            height,
            segments,
        )?))
    }

    pub fn heightfield(data: Vec<Vec<f32>>, element_size: f32) -> Result<Self, ShapeError> {
        Ok(Shape::Heightfield(Heightfield::new(data, element_size)?))
    }

    pub fn compound(children: Vec<CompoundChild>) -> Result<Self, ShapeError> {
        if children.is_empty() {
            return Err(ShapeError::EmptyCompound);
        }
        Ok(Shape::Compound(children))
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Plane => ShapeKind::Plane,
            Shape::Box(_) => ShapeKind::Box,
            Shape::ConvexPolyhedron(_) => ShapeKind::ConvexPolyhedron,
            Shape::Heightfield(_) => ShapeKind::Heightfield,
            Shape::Particle => ShapeKind::Particle,
            Shape::Ellipsoid { .. } => ShapeKind::Ellipsoid,
            Shape::Compound(_) => ShapeKind::Compound,
        }
    }

    /// Hull used by SAT, for shapes that have one.
    pub fn hull(&self) -> Option<&ConvexPolyhedron> {
        match self {
            Shape::Box(cuboid) => Some(cuboid.hull()),
            Shape::ConvexPolyhedron(hull) => Some(hull),
            _ => None,
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3),
            Shape::Ellipsoid { radii } => 4.0 / 3.0 * std::f32::consts::PI * radii.x * radii.y * radii.z,
            Shape::Box(cuboid) => 8.0 * cuboid.half_extents.x * cuboid.half_extents.y * cuboid.half_extents.z,
            Shape::ConvexPolyhedron(hull) => hull.volume(),
            Shape::Heightfield(hf) => hf.volume(),
            Shape::Plane | Shape::Particle => 0.0,
            Shape::Compound(children) => children.iter().map(|c| c.shape.volume()).sum(),
        }
    }

    /// Principal moments of inertia for the given mass, about the local origin.
    ///
    /// Convex hulls and heightfields use their bounding box as an approximation.
    pub fn local_inertia(&self, mass: f32) -> Vec3 {
        match self {
            Shape::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
            Shape::Ellipsoid { radii } => {
                let sq = *radii * *radii;
                Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (0.2 * mass)
            }
            Shape::Box(cuboid) => box_inertia(cuboid.half_extents, mass),
            Shape::ConvexPolyhedron(hull) => box_inertia(hull.local_aabb().extents() * 0.5, mass),
            Shape::Heightfield(hf) => box_inertia(hf.local_aabb().extents() * 0.5, mass),
            Shape::Plane | Shape::Particle => Vec3::ZERO,
            Shape::Compound(children) => compound_inertia(children, mass),
        }
    }

    /// Radius of a sphere around the local origin that contains the shape.
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => *radius,
            Shape::Ellipsoid { radii } => radii.max_element(),
            Shape::Box(cuboid) => cuboid.half_extents.length(),
            Shape::ConvexPolyhedron(hull) => hull.bounding_radius(),
            Shape::Heightfield(hf) => {
                let aabb = hf.local_aabb();
                aabb.min.abs().max(aabb.max.abs()).length()
            }
            Shape::Plane => f32::INFINITY,
            Shape::Particle => 0.0,
            Shape::Compound(children) => children
                .iter()
                .map(|c| c.pose.position.length() + c.shape.bounding_radius())
                .fold(0.0, f32::max),
        }
    }

    pub fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Sphere { radius } => {
                Aabb::from_center_half_extents(pose.position, Vec3::splat(*radius))
            }
            Shape::Box(cuboid) => Aabb::from_oriented_box(pose, Vec3::ZERO, cuboid.half_extents),
            Shape::Ellipsoid { radii } => {
                // Row i of R * diag(radii) has length equal to the extent along world axis i.
                let m = Mat3::from_quat(pose.rotation) * Mat3::from_diagonal(*radii);
                let t = m.transpose();
                let extent = Vec3::new(t.x_axis.length(), t.y_axis.length(), t.z_axis.length());
                Aabb::from_center_half_extents(pose.position, extent)
            }
            Shape::ConvexPolyhedron(hull) => hull.aabb(pose),
            Shape::Heightfield(hf) => {
                let local = hf.local_aabb();
                Aabb::from_oriented_box(pose, local.center(), local.extents() * 0.5)
            }
            Shape::Plane => plane_aabb(pose),
            Shape::Particle => Aabb::new(pose.position, pose.position),
            Shape::Compound(children) => children.iter().fold(Aabb::EMPTY, |acc, c| {
                acc.union(&c.shape.aabb(&pose.compose(&c.pose)))
            }),
        }
    }
}

fn box_inertia(half_extents: Vec3, mass: f32) -> Vec3 {
    let e = half_extents * 2.0;
    Vec3::new(
        mass / 12.0 * (e.y * e.y + e.z * e.z),
        mass / 12.0 * (e.x * e.x + e.z * e.z),
        mass / 12.0 * (e.x * e.x + e.y * e.y),
    )
}

// Mass is split by child volume, then shifted by the parallel-axis theorem.
fn compound_inertia(children: &[CompoundChild], mass: f32) -> Vec3 {
    let total: f32 = children.iter().map(|c| c.shape.volume()).sum();
    let mut inertia = Vec3::ZERO;
    for child in children {
        let share = if total > 0.0 {
            child.shape.volume() / total
        } else {
            1.0 / children.len() as f32
        };
        let child_mass = mass * share;
        let local = child.shape.local_inertia(child_mass);
        let r = Mat3::from_quat(child.pose.rotation);
        let rotated = r * Mat3::from_diagonal(local) * r.transpose();
        let o = child.pose.position;
        inertia += Vec3::new(rotated.x_axis.x, rotated.y_axis.y, rotated.z_axis.z)
            + child_mass * Vec3::new(o.y * o.y + o.z * o.z, o.x * o.x + o.z * o.z, o.x * o.x + o.y * o.y);
    }
    inertia
}

// Half-space bounds when the normal is axis-aligned, unbounded otherwise.
fn plane_aabb(pose: &Pose) -> Aabb {
    let n = pose.transform_vector(Vec3::Y);
    let p = pose.position;
    let mut aabb = Aabb::INFINITE;
    const AXIS_EPSILON: f32 = 1e-6;
    for axis in 0..3 {
        if (n[axis] - 1.0).abs() < AXIS_EPSILON {
            aabb.max[axis] = p[axis];
        } else if (n[axis] + 1.0).abs() < AXIS_EPSILON {
            aabb.min[axis] = p[axis];
        }
    }
    aabb
}
