//! Spatial indices that list particle pairs within a cutoff.
//!
//! Pairs are reported once as `(i, j)` with `i < j`, using the minimum-image
//! separation of the domain they were last updated with.

use crate::domain::{wrap_unit_cell, Domain, PeriodicDomain};

/// The spatial index service consumed by the near-field solver.
pub trait SpatialIndex: Send {
    /// Replace the indexed points.
    fn update(&mut self, positions: &[[f64; 3]], domain: &dyn Domain);

    /// All pairs `(i, j)`, `i < j`, closer than `rcut`, sorted.
    fn self_neighbor_list(&self, rcut: f64) -> Vec<(usize, usize)>;

    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of the domain geometry needed for minimum imaging.
fn snapshot(domain: &dyn Domain) -> PeriodicDomain {
    PeriodicDomain::new(domain.periodic_lengths()).with_strain(domain.strain())
}

fn within(domain: &PeriodicDomain, a: &[f64; 3], b: &[f64; 3], rcut_sq: f64) -> bool {
    let r = domain.minimum_image(&[a[0] - b[0], a[1] - b[1], a[2] - b[2]]);
    r[0] * r[0] + r[1] * r[1] + r[2] * r[2] < rcut_sq
}

/// Quadratic reference index: tests every pair.
#[derive(Debug, Clone)]
pub struct AllPairs {
    positions: Vec<[f64; 3]>,
    domain: PeriodicDomain,
}

impl AllPairs {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            domain: PeriodicDomain::free_space(),
        }
    }
}

impl Default for AllPairs {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex for AllPairs {
    fn update(&mut self, positions: &[[f64; 3]], domain: &dyn Domain) {
        self.positions = positions.to_vec();
        self.domain = snapshot(domain);
    }

    fn self_neighbor_list(&self, rcut: f64) -> Vec<(usize, usize)> {
        let rcut_sq = rcut * rcut;
        let n = self.positions.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                if within(&self.domain, &self.positions[i], &self.positions[j], rcut_sq) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Half of the 26 neighbouring cells plus the cell itself.
const FORWARD_NEIGHBOUR_OFFSETS: [[isize; 3]; 14] = [
    [0, 0, 0],
    [1, 0, 0],
    [-1, 1, 0],
    [0, 1, 0],
    [1, 1, 0],
    [-1, -1, 1],
    [0, -1, 1],
    [1, -1, 1],
    [-1, 0, 1],
    [0, 0, 1],
    [1, 0, 1],
    [-1, 1, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Linked-cell index binned in primed (lattice) coordinates.
///
/// Cells are at least `rcut * safety_factor` wide so every pair within the
/// cutoff lies in the same or an adjacent cell. Periodic axes that fit fewer
/// than three cells fall back to testing all pairs.
#[derive(Debug, Clone)]
pub struct CellList {
    positions: Vec<[f64; 3]>,
    primed: Vec<[f64; 3]>,
    domain: PeriodicDomain,
}

impl CellList {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            primed: Vec::new(),
            domain: PeriodicDomain::free_space(),
        }
    }

    fn brute_force(&self, rcut_sq: f64) -> Vec<(usize, usize)> {
        let n = self.positions.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                if within(&self.domain, &self.positions[i], &self.positions[j], rcut_sq) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

impl Default for CellList {
    fn default() -> Self {
        Self::new()
    }
}

/// Binning of one axis.
struct AxisBins {
    origin: f64,
    width: f64,
    count: usize,
    periodic: bool,
}

impl AxisBins {
    fn index(&self, x: f64) -> usize {
        if self.width <= 0.0 {
            return 0;
        }
        (((x - self.origin) / self.width).floor().max(0.0) as usize).min(self.count - 1)
    }

    /// Neighbouring bin along this axis, if it exists.
    fn shift(&self, c: usize, offset: isize) -> Option<usize> {
        let s = c as isize + offset;
        if self.periodic {
            Some(s.rem_euclid(self.count as isize) as usize)
        } else if s < 0 || s >= self.count as isize {
            None
        } else {
            Some(s as usize)
        }
    }
}

impl SpatialIndex for CellList {
    fn update(&mut self, positions: &[[f64; 3]], domain: &dyn Domain) {
        self.positions = positions.to_vec();
        self.domain = snapshot(domain);
        let lengths = self.domain.periodic_lengths();
        self.primed = positions
            .iter()
            .map(|x| {
                let mut p = self.domain.prime_coords(x);
                for d in 0..3 {
                    if let Some(len) = lengths[d] {
                        p[d] = wrap_unit_cell(p[d], len);
                    }
                }
                p
            })
            .collect();
    }

    fn self_neighbor_list(&self, rcut: f64) -> Vec<(usize, usize)> {
        let rcut_sq = rcut * rcut;
        if self.primed.len() < 2 || rcut <= 0.0 {
            return Vec::new();
        }
        let min_width = rcut * self.domain.safety_factor();
        let lengths = self.domain.periodic_lengths();

        let mut bins = Vec::with_capacity(3);
        for d in 0..3 {
            let axis = match lengths[d] {
                Some(len) => {
                    let count = (len / min_width).floor() as usize;
                    if count < 3 {
                        return self.brute_force(rcut_sq);
                    }
                    AxisBins {
                        origin: 0.0,
                        width: len / count as f64,
                        count,
                        periodic: true,
                    }
                }
                None => {
                    let (lo, hi) = self
                        .primed
                        .iter()
                        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                            (lo.min(p[d]), hi.max(p[d]))
                        });
                    let extent = hi - lo;
                    let count = ((extent / min_width).floor() as usize).max(1);
                    AxisBins {
                        origin: lo,
                        width: extent / count as f64,
                        count,
                        periodic: false,
                    }
                }
            };
            bins.push(axis);
        }

        let (nx, ny, nz) = (bins[0].count, bins[1].count, bins[2].count);
        let cell_index = |cx: usize, cy: usize, cz: usize| (cz * ny + cy) * nx + cx;
        let mut cells: Vec<Vec<usize>> = vec![Vec::new(); nx * ny * nz];
        for (i, p) in self.primed.iter().enumerate() {
            let c = cell_index(bins[0].index(p[0]), bins[1].index(p[1]), bins[2].index(p[2]));
            cells[c].push(i);
        }

        let mut pairs = Vec::new();
        for cz in 0..nz {
            for cy in 0..ny {
                for cx in 0..nx {
                    let home = &cells[cell_index(cx, cy, cz)];
                    if home.is_empty() {
                        continue;
                    }
                    for offset in &FORWARD_NEIGHBOUR_OFFSETS {
                        let (Some(ox), Some(oy), Some(oz)) = (
                            bins[0].shift(cx, offset[0]),
                            bins[1].shift(cy, offset[1]),
                            bins[2].shift(cz, offset[2]),
                        ) else {
                            continue;
                        };
                        let same = *offset == [0, 0, 0];
                        let other = &cells[cell_index(ox, oy, oz)];
                        for (a, &i) in home.iter().enumerate() {
                            let candidates = if same { &home[a + 1..] } else { &other[..] };
                            for &j in candidates {
                                if within(&self.domain, &self.positions[i], &self.positions[j], rcut_sq) {
                                    pairs.push((i.min(j), i.max(j)));
                                }
                            }
                        }
                    }
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}
