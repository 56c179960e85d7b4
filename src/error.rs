//! Error types for shape construction, geometry queries, and world operations.

use glam::Vec3;
use thiserror::Error;

use crate::dynamics::{ConstraintHandle, MaterialId};
use crate::BodyHandle;

/// Invalid shape parameters, reported when a shape is constructed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("radius must be positive and finite, got {0}")]
    NonPositiveRadius(f32),
    #[error("half-extents must be positive and finite, got {0:?}")]
    NonPositiveExtents(Vec3),
    #[error("height must be positive and finite, got {0}")]
    NonPositiveHeight(f32),
    #[error("at least 3 segments are required, got {0}")]
    TooFewSegments(usize),
    #[error("degenerate convex hull: {vertices} unique vertices, {faces} faces")]
    DegenerateHull { vertices: usize, faces: usize },
    #[error("face {face} is invalid: {reason}")]
    InvalidFace { face: usize, reason: &'static str },
    #[error("heightfield needs at least 2x2 samples, got {rows}x{columns}")]
    HeightfieldTooSmall { rows: usize, columns: usize },
    #[error("heightfield row {row} has {found} samples, expected {expected}")]
    RaggedHeightfield {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("heightfield sample ({row}, {column}) is not finite")]
    NonFiniteHeight { row: usize, column: usize },
    #[error("heightfield element size must be positive and finite, got {0}")]
    NonPositiveElementSize(f32),
    #[error("compound shape has no children")]
    EmptyCompound,
}

/// Degenerate geometry met while generating contacts for a single pair.
///
/// These never abort a step: the pair simply contributes no contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("hull has no faces to test as separating axes")]
    DegenerateHull,
    #[error("no reference face found for clipping")]
    NoReferenceFace,
}

/// Errors raised at the world API boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("dynamic body mass must be positive and finite, got {0}")]
    InvalidMass(f32),
    #[error("body {0:?} is not registered with this world")]
    UnknownBody(BodyHandle),
    #[error("constraint {0:?} is not registered with this world")]
    UnknownConstraint(ConstraintHandle),
    #[error("material {0:?} is not registered with this world")]
    UnknownMaterial(MaterialId),
    #[error("constraint connects body {0:?} to itself")]
    SelfConstraint(BodyHandle),
}
