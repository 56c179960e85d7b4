//! Broadphase collision detection: candidate body pairs from AABB overlap.
//!
//! Three interchangeable strategies share one contract and produce identical,
//! sorted pair lists, so the choice never changes simulation outcome.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::dynamics::CollisionFilter;
use crate::shape::Aabb;

/// What the broadphase needs to know about one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadphaseProxy {
    pub aabb: Aabb,
    pub dynamic: bool,
    /// False for static and sleeping bodies.
    pub active: bool,
    pub filter: CollisionFilter,
}

impl BroadphaseProxy {
    /// Body-level pair test, independent of geometry.
    #[inline]
    pub fn can_pair(&self, other: &BroadphaseProxy) -> bool {
        (self.dynamic || other.dynamic)
            && (self.active || other.active)
            && self.filter.allows(&other.filter)
    }

    #[inline]
    fn accepts(&self, other: &BroadphaseProxy) -> bool {
        self.can_pair(other) && self.aabb.overlaps(&other.aabb)
    }
}

pub trait Broadphase: Send {
    /// Fill `pairs` with unique `(i, j)`, `i < j`, sorted ascending.
    fn collision_pairs(&mut self, proxies: &[BroadphaseProxy], pairs: &mut Vec<(usize, usize)>);
}

/// Axis used by [`SweepAndPrune`] for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SapAxis {
    X,
    Y,
    Z,
    /// Axis of largest AABB-center variance, chosen every step.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BroadphaseKind {
    Naive,
    Grid {
        /// Fixed cell size; derived from the largest body when `None`.
        cell_size: Option<f32>,
    },
    SweepAndPrune { axis: SapAxis },
}

impl Default for BroadphaseKind {
    fn default() -> Self {
        BroadphaseKind::SweepAndPrune {
            axis: SapAxis::Auto,
        }
    }
}

impl BroadphaseKind {
    pub fn build(self) -> Box<dyn Broadphase> {
        match self {
            BroadphaseKind::Naive => Box::new(NaiveBroadphase),
            BroadphaseKind::Grid { cell_size } => Box::new(GridBroadphase::new(cell_size)),
            BroadphaseKind::SweepAndPrune { axis } => Box::new(SweepAndPrune::new(axis)),
        }
    }
}

/// Every pair, AABB-confirmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveBroadphase;

impl Broadphase for NaiveBroadphase {
    fn collision_pairs(&mut self, proxies: &[BroadphaseProxy], pairs: &mut Vec<(usize, usize)>) {
        pairs.clear();
        for i in 0..proxies.len() {
            for j in (i + 1)..proxies.len() {
                if proxies[i].accepts(&proxies[j]) {
                    pairs.push((i, j));
                }
            }
        }
    }
}

type CellKey = (i32, i32, i32);

/// Cells a single body may occupy before it is treated as oversized.
const MAX_CELLS_PER_BODY: i64 = 4096;
const MIN_CELL_SIZE: f32 = 1e-3;

/// Uniform spatial hash grid.
///
/// Each body is inserted into every cell its AABB touches. Unbounded or
/// oversized bodies are tested against everything instead.
#[derive(Debug, Clone, Default)]
pub struct GridBroadphase {
    cell_size: Option<f32>,
    cells: HashMap<CellKey, Vec<usize>>,
    oversized: Vec<usize>,
    seen: HashSet<(usize, usize)>,
}

impl GridBroadphase {
    pub fn new(cell_size: Option<f32>) -> Self {
        Self {
            cell_size,
            ..Default::default()
        }
    }

    #[inline]
    fn cell_coords(point: Vec3, inv: f32) -> CellKey {
        (
            (point.x * inv).floor() as i32,
            (point.y * inv).floor() as i32,
            (point.z * inv).floor() as i32,
        )
    }

    fn push_pair(&mut self, proxies: &[BroadphaseProxy], i: usize, j: usize, pairs: &mut Vec<(usize, usize)>) {
        let pair = if i < j { (i, j) } else { (j, i) };
        if !self.seen.contains(&pair) && proxies[i].accepts(&proxies[j]) {
            self.seen.insert(pair);
            pairs.push(pair);
        }
    }
}

impl Broadphase for GridBroadphase {
    fn collision_pairs(&mut self, proxies: &[BroadphaseProxy], pairs: &mut Vec<(usize, usize)>) {
        pairs.clear();
        self.seen.clear();
        self.oversized.clear();
        for cell in self.cells.values_mut() {
            cell.clear();
        }

        let cell_size = self.cell_size.unwrap_or_else(|| {
            proxies
                .iter()
                .filter(|p| p.aabb.is_finite())
                .map(|p| p.aabb.extents().max_element())
                .fold(1.0f32, f32::max)
        });
        let inv = 1.0 / cell_size.max(MIN_CELL_SIZE);

        for (index, proxy) in proxies.iter().enumerate() {
            if proxy.aabb.is_empty() {
                continue;
            }
            if !proxy.aabb.is_finite() {
                self.oversized.push(index);
                continue;
            }
            let lo = Self::cell_coords(proxy.aabb.min, inv);
            let hi = Self::cell_coords(proxy.aabb.max, inv);
            let span = |a: i32, b: i32| i64::from(b) - i64::from(a) + 1;
            let cells = span(lo.0, hi.0)
                .saturating_mul(span(lo.1, hi.1))
                .saturating_mul(span(lo.2, hi.2));
            if cells > MAX_CELLS_PER_BODY {
                self.oversized.push(index);
                continue;
            }
            for cx in lo.0..=hi.0 {
                for cy in lo.1..=hi.1 {
                    for cz in lo.2..=hi.2 {
                        self.cells.entry((cx, cy, cz)).or_default().push(index);
                    }
                }
            }
        }

        let cells = std::mem::take(&mut self.cells);
        for cell in cells.values() {
            for a in 0..cell.len() {
                for b in (a + 1)..cell.len() {
                    self.push_pair(proxies, cell[a], cell[b], pairs);
                }
            }
        }
        self.cells = cells;
        self.cells.retain(|_, cell| !cell.is_empty());

        let oversized = std::mem::take(&mut self.oversized);
        for &i in &oversized {
            for j in 0..proxies.len() {
                if i != j && !proxies[j].aabb.is_empty() {
                    self.push_pair(proxies, i, j, pairs);
                }
            }
        }
        self.oversized = oversized;

        pairs.sort_unstable();
    }
}

/// Sort-and-sweep along one axis with an active list.
#[derive(Debug, Clone)]
pub struct SweepAndPrune {
    axis: SapAxis,
    order: Vec<usize>,
    active: Vec<usize>,
}

impl SweepAndPrune {
    pub fn new(axis: SapAxis) -> Self {
        Self {
            axis,
            order: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Axis of largest variance of finite AABB centers.
    pub fn auto_axis(proxies: &[BroadphaseProxy]) -> usize {
        let mut sum = Vec3::ZERO;
        let mut sum_sq = Vec3::ZERO;
        let mut n = 0.0f32;
        for p in proxies.iter().filter(|p| p.aabb.is_finite()) {
            let c = p.aabb.center();
            sum += c;
            sum_sq += c * c;
            n += 1.0;
        }
        if n == 0.0 {
            return 0;
        }
        let variance = sum_sq / n - (sum / n) * (sum / n);
        if variance.y > variance.x && variance.y >= variance.z {
            1
        } else if variance.z > variance.x && variance.z > variance.y {
            2
        } else {
            0
        }
    }
}

impl Default for SweepAndPrune {
    fn default() -> Self {
        Self::new(SapAxis::Auto)
    }
}

impl Broadphase for SweepAndPrune {
    fn collision_pairs(&mut self, proxies: &[BroadphaseProxy], pairs: &mut Vec<(usize, usize)>) {
        pairs.clear();
        let axis = match self.axis {
            SapAxis::X => 0,
            SapAxis::Y => 1,
            SapAxis::Z => 2,
            SapAxis::Auto => Self::auto_axis(proxies),
        };

        self.order.clear();
        self.order
            .extend((0..proxies.len()).filter(|&i| !proxies[i].aabb.is_empty()));
        self.order
            .sort_by(|&a, &b| proxies[a].aabb.min[axis].total_cmp(&proxies[b].aabb.min[axis]));

        self.active.clear();
        for &i in &self.order {
            let min = proxies[i].aabb.min[axis];
            self.active.retain(|&j| proxies[j].aabb.max[axis] >= min);
            for &j in &self.active {
                if proxies[i].accepts(&proxies[j]) {
                    pairs.push(if i < j { (i, j) } else { (j, i) });
                }
            }
            self.active.push(i);
        }

        pairs.sort_unstable();
    }
}
