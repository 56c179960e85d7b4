use std::ops::RangeInclusive;

use glam::Vec3;

use super::{Aabb, ConvexPolyhedron};
use crate::error::ShapeError;

/// Grid of heights over the local X/Z plane, Y up.
///
/// `data[xi][zi]` is the height at local `(xi * element_size, h, zi * element_size)`.
#[derive(Debug, Clone)]
pub struct Heightfield {
    data: Vec<Vec<f32>>,
    element_size: f32,
    min_height: f32,
    max_height: f32,
}

impl Heightfield {
    pub fn new(data: Vec<Vec<f32>>, element_size: f32) -> Result<Self, ShapeError> {
        if !(element_size.is_finite() && element_size > 0.0) {
            return Err(ShapeError::NonPositiveElementSize(element_size));
        }
        let rows = data.len();
        let columns = data.first().map_or(0, Vec::len);
        if rows < 2 || columns < 2 {
            return Err(ShapeError::HeightfieldTooSmall { rows, columns });
        }

        let mut min_height = f32::INFINITY;
        let mut max_height = f32::NEG_INFINITY;
        for (row, samples) in data.iter().enumerate() {
            if samples.len() != columns {
                return Err(ShapeError::RaggedHeightfield {
                    row,
                    expected: columns,
                    found: samples.len(),
                });
            }
            for (column, &h) in samples.iter().enumerate() {
                if !h.is_finite() {
                    return Err(ShapeError::NonFiniteHeight { row, column });
                }
                min_height = min_height.min(h);
                max_height = max_height.max(h);
            }
        }

        Ok(Self {
            data,
            element_size,
            min_height,
            max_height,
        })
    }

    pub fn rows(&self) -> usize {
        self.data.len()
    }

    pub fn columns(&self) -> usize {
        self.data[0].len()
    }

    pub fn element_size(&self) -> f32 {
        self.element_size
    }

    pub fn height(&self, xi: usize, zi: usize) -> f32 {
        self.data[xi][zi]
    }

    pub fn min_height(&self) -> f32 {
        self.min_height
    }

    pub fn max_height(&self) -> f32 {
        self.max_height
    }

    /// Bottom of every cell prism.
    pub fn floor(&self) -> f32 {
        self.min_height - self.element_size.max(1.0)
    }

    pub fn local_aabb(&self) -> Aabb {
        Aabb::new(
            Vec3::new(0.0, self.floor(), 0.0),
            Vec3::new(
                (self.rows() - 1) as f32 * self.element_size,
                self.max_height,
                (self.columns() - 1) as f32 * self.element_size,
            ),
        )
    }

    /// Approximate solid volume above the prism floor.
    pub fn volume(&self) -> f32 {
        let floor = self.floor();
        let area = self.element_size * self.element_size;
        let mut volume = 0.0;
        for xi in 0..self.rows() - 1 {
            for zi in 0..self.columns() - 1 {
                let mean = (self.data[xi][zi]
                    + self.data[xi + 1][zi]
                    + self.data[xi][zi + 1]
                    + self.data[xi + 1][zi + 1])
                    * 0.25;
                volume += (mean - floor) * area;
            }
        }
        volume
    }

    /// Cells touched by a sphere given in local coordinates.
    ///
    /// Returns `None` when the sphere misses the grid or lies entirely above it.
    pub fn cells_under(
        &self,
        center: Vec3,
        radius: f32,
    ) -> Option<(RangeInclusive<usize>, RangeInclusive<usize>)> {
        if center.y - radius > self.max_height || center.y + radius < self.floor() {
            return None;
        }
        let last_x = (self.rows() - 2) as f32;
        let last_z = (self.columns() - 2) as f32;
        let x0 = ((center.x - radius) / self.element_size).floor();
        let x1 = ((center.x + radius) / self.element_size).floor();
        let z0 = ((center.z - radius) / self.element_size).floor();
        let z1 = ((center.z + radius) / self.element_size).floor();
        if x1 < 0.0 || z1 < 0.0 || x0 > last_x || z0 > last_z {
            return None;
        }
        let clamp = |v: f32, hi: f32| v.clamp(0.0, hi) as usize;
        Some((
            clamp(x0, last_x)..=clamp(x1, last_x),
            clamp(z0, last_z)..=clamp(z1, last_z),
        ))
    }

    /// The two triangular prisms of cell `(xi, zi)`, in local coordinates.
    pub fn cell_prisms(&self, xi: usize, zi: usize) -> Result<[ConvexPolyhedron; 2], ShapeError> {
        let s = self.element_size;
        let corner = |dx: usize, dz: usize| {
            Vec3::new(
                (xi + dx) as f32 * s,
                self.data[xi + dx][zi + dz],
                (zi + dz) as f32 * s,
            )
        };
        let first = self.prism([corner(0, 0), corner(1, 0), corner(0, 1)])?;
        let second = self.prism([corner(1, 1), corner(0, 1), corner(1, 0)])?;
        Ok([first, second])
    }

    fn prism(&self, top: [Vec3; 3]) -> Result<ConvexPolyhedron, ShapeError> {
        let floor = self.floor();
        let mut vertices = top.to_vec();
        vertices.extend(top.iter().map(|v| Vec3::new(v.x, floor, v.z)));
        let faces = vec![
            vec![0, 1, 2],
            vec![3, 5, 4],
            vec![0, 3, 4, 1],
            vec![1, 4, 5, 2],
            vec![2, 5, 3, 0],
        ];
        ConvexPolyhedron::new(vertices, faces)
    }
}
