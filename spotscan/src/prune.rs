//! Overlap pruning of candidates detected at neighbouring scales.

use smallvec::SmallVec;

use crate::config::PruningConfig;
use crate::detection::CandidateSpot;
use crate::error::{Error, Result};
use crate::scale::ScaleLadder;

/// Upper bound on grid cells allocated per spot.
const MAX_CELLS_PER_SPOT: usize = 4;

/// Candidate with its scale index resolved to a sigma.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrunedSpot {
    pub x: usize,
    pub y: usize,
    pub sigma: f32,
}

/// Greedy overlap pruner.
///
/// Blobs are visited by sigma descending, then `(y, x)` ascending; a blob
/// survives if it is at least `overlap * (σa + σb)` away from every blob that
/// survived before it. Survivors are returned in row-major order.
#[derive(Debug, Clone)]
pub struct BlobPruner {
    sigmas: Vec<f32>,
    overlap: f32,
}

impl BlobPruner {
    pub fn new(sigmas: Vec<f32>, overlap: f32) -> Self {
        Self { sigmas, overlap }
    }

    pub fn from_config(ladder: &ScaleLadder, config: &PruningConfig) -> Self {
        Self::new(ladder.prune_sigmas(&config.sigmas), config.overlap)
    }

    /// Maps each candidate's scale index through the sigma table.
    pub fn resolve(&self, candidates: &[CandidateSpot]) -> Result<Vec<PrunedSpot>> {
        candidates
            .iter()
            .map(|c| {
                let sigma = *self.sigmas.get(c.scale).ok_or(Error::UnknownScale {
                    x: c.x,
                    y: c.y,
                    scale: c.scale,
                    len: self.sigmas.len(),
                })?;
                Ok(PrunedSpot {
                    x: c.x,
                    y: c.y,
                    sigma,
                })
            })
            .collect()
    }

    pub fn prune(&self, candidates: &[CandidateSpot]) -> Result<Vec<PrunedSpot>> {
        let mut spots = self.resolve(candidates)?;
        let before = spots.len();
        self.prune_resolved(&mut spots);
        tracing::debug!(before, after = spots.len(), "Pruned overlapping blobs");
        Ok(spots)
    }

    /// Prunes in place. Uses a uniform grid anchored at the spots' bounding
    /// box, so each blob only checks the 3×3 neighbouring cells. Cells are at
    /// least the largest possible overlap distance, and grow as needed to keep
    /// the grid within `MAX_CELLS_PER_SPOT` cells per spot.
    pub fn prune_resolved(&self, spots: &mut Vec<PrunedSpot>) {
        if spots.len() < 2 {
            return;
        }

        spots.sort_by(|a, b| {
            b.sigma
                .total_cmp(&a.sigma)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });

        let max_sigma = spots[0].sigma;
        let overlap_distance = (self.overlap * 2.0 * max_sigma) as f64;
        if overlap_distance <= 0.0 {
            spots.sort_by_key(|s| (s.y, s.x));
            return;
        }

        let mut min_x = usize::MAX;
        let mut min_y = usize::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        for s in spots.iter() {
            min_x = min_x.min(s.x);
            min_y = min_y.min(s.y);
            max_x = max_x.max(s.x);
            max_y = max_y.max(s.y);
        }

        let span = (max_x - min_x).max(max_y - min_y) as f64;
        let cells_per_side = ((spots.len() * MAX_CELLS_PER_SPOT) as f64).sqrt().floor();
        let cell_size = overlap_distance.max(span / cells_per_side).max(1.0);

        let grid_width = ((max_x - min_x) as f64 / cell_size) as usize + 1;
        let grid_height = ((max_y - min_y) as f64 / cell_size) as usize + 1;
        let cell_of = |s: &PrunedSpot| {
            (
                ((s.x - min_x) as f64 / cell_size) as usize,
                ((s.y - min_y) as f64 / cell_size) as usize,
            )
        };

        let mut grid: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); grid_width * grid_height];
        let mut kept = vec![false; spots.len()];

        for i in 0..spots.len() {
            let spot = spots[i];
            let (cell_x, cell_y) = cell_of(&spot);

            let mut overlaps = false;
            'outer: for dy in 0..3 {
                let ny = (cell_y + dy).wrapping_sub(1);
                if ny >= grid_height {
                    continue;
                }
                for dx in 0..3 {
                    let nx = (cell_x + dx).wrapping_sub(1);
                    if nx >= grid_width {
                        continue;
                    }
                    for &other_idx in &grid[ny * grid_width + nx] {
                        if self.overlaps(&spot, &spots[other_idx]) {
                            overlaps = true;
                            break 'outer;
                        }
                    }
                }
            }

            if !overlaps {
                kept[i] = true;
                grid[cell_y * grid_width + cell_x].push(i);
            }
        }

        let mut index = 0;
        spots.retain(|_| {
            let keep = kept[index];
            index += 1;
            keep
        });
        spots.sort_by_key(|s| (s.y, s.x));
    }

    #[inline]
    fn overlaps(&self, a: &PrunedSpot, b: &PrunedSpot) -> bool {
        let dx = a.x as f32 - b.x as f32;
        let dy = a.y as f32 - b.y as f32;
        let limit = self.overlap * (a.sigma + b.sigma);
        dx * dx + dy * dy < limit * limit
    }
}
