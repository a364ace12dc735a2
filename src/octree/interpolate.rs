//! Interpolation engine - inverse-distance weighting with a Gaussian
//! decay kernel scaled by local interdistance.
//!
//! Leaves reconstruct their grids directly from the scattered samples of
//! the node and its 26 same-level neighbors. Branches reconstruct their
//! coarse grid by block-averaging child node grids and their fine grid by
//! trilinear lookups that recurse into the children; the children's sample
//! clouds and grids are discarded once consumed.
//!
//! Grid memory layout is X fastest: `index = (z * dim + y) * dim + x`.

use std::sync::atomic::AtomicU64;

use glam::Vec3;

use crate::config::TreeConfig;
use crate::sample::Sample;

use super::coord::NodeCoord;
use super::tree::{ensure_slot, find_slot, gather_subtree, NodeSlot, Octree};

/// Contributions beyond this many kernel radii are skipped entirely.
pub(crate) const SUPPORT_SIGMAS: f32 = 3.0;

/// Distance floor so a grid point sitting exactly on a sample stays finite.
const MIN_DISTANCE: f32 = 1e-6;

#[inline]
pub(crate) fn grid_index(dim: usize, x: usize, y: usize, z: usize) -> usize {
  (z * dim + y) * dim + x
}

/// IDW value at one point.
///
/// `value = Σ w_i · exp(-d_i² / (2 r_i²)) / d_i` normalized by `Σ 1/d_i`,
/// with `r_i = max(half_cell, spacing_i)`.
pub(crate) fn idw_value(samples: &[Sample], at: Vec3, half_cell: f32) -> f32 {
  let mut numerator = 0.0f64;
  let mut normalizer = 0.0f64;

  for sample in samples {
    let dist = (sample.position - at).length().max(MIN_DISTANCE);
    let radius = sample.spacing.max(half_cell);
    if dist > SUPPORT_SIGMAS * radius {
      continue;
    }
    let decay = (-(dist * dist) / (2.0 * radius * radius)).exp();
    numerator += (sample.weight * decay / dist) as f64;
    normalizer += (1.0 / dist) as f64;
  }

  if normalizer > 0.0 {
    (numerator / normalizer) as f32
  } else {
    0.0
  }
}

/// Evaluate a dense grid of IDW values over a node extent.
pub(crate) fn eval_grid(samples: &[Sample], min: Vec3, size: f32, dim: usize) -> Vec<f32> {
  let cell = size / dim as f32;
  let half_cell = cell * 0.5;
  let mut grid = vec![0.0f32; dim * dim * dim];
  for z in 0..dim {
    for y in 0..dim {
      for x in 0..dim {
        let at = min
          + Vec3::new(
            (x as f32 + 0.5) * cell,
            (y as f32 + 0.5) * cell,
            (z as f32 + 0.5) * cell,
          );
        grid[grid_index(dim, x, y, z)] = idw_value(samples, at, half_cell);
      }
    }
  }
  grid
}

/// Trilinear sample of a node-local grid of cell-center values.
pub(crate) fn trilinear(grid: &[f32], dim: usize, coord: NodeCoord, at: Vec3) -> f32 {
  let cell = coord.size() / dim as f32;
  let local = (at - coord.min()) / cell - Vec3::splat(0.5);
  let top = (dim - 1) as f32;

  let cx = local.x.clamp(0.0, top);
  let cy = local.y.clamp(0.0, top);
  let cz = local.z.clamp(0.0, top);

  let x0 = cx.floor() as usize;
  let y0 = cy.floor() as usize;
  let z0 = cz.floor() as usize;
  let x1 = (x0 + 1).min(dim - 1);
  let y1 = (y0 + 1).min(dim - 1);
  let z1 = (z0 + 1).min(dim - 1);

  let fx = cx - x0 as f32;
  let fy = cy - y0 as f32;
  let fz = cz - z0 as f32;

  let sample = |x: usize, y: usize, z: usize| grid[grid_index(dim, x, y, z)];
  let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

  let c00 = lerp(sample(x0, y0, z0), sample(x1, y0, z0), fx);
  let c10 = lerp(sample(x0, y1, z0), sample(x1, y1, z0), fx);
  let c01 = lerp(sample(x0, y0, z1), sample(x1, y0, z1), fx);
  let c11 = lerp(sample(x0, y1, z1), sample(x1, y1, z1), fx);
  lerp(lerp(c00, c10, fy), lerp(c01, c11, fy), fz)
}

/// Reconstructed value of the subtree at `idx` at a position.
///
/// Every dispatch branch returns: positions outside the node or over
/// uninterpolated leaves read as zero.
pub(crate) fn lookup_value(arena: &[NodeSlot], idx: usize, at: Vec3, brick_dim: usize) -> f32 {
  let slot = &arena[idx];
  match slot.first_child() {
    Some(first) => match slot.coord.octant_of(at) {
      Some(octant) => lookup_value(arena, first as usize + octant as usize, at, brick_dim),
      None => 0.0,
    },
    None => {
      let state = slot.state.lock().unwrap();
      match &state.voxel_grid {
        Some(grid) => trilinear(grid, brick_dim, slot.coord, at),
        None => 0.0,
      }
    }
  }
}

/// Whether any voxel on the given outward face of a grid is nonzero.
fn face_has_signal(grid: &[f32], dim: usize, axis: usize, positive: bool) -> bool {
  let fixed = if positive { dim - 1 } else { 0 };
  for a in 0..dim {
    for b in 0..dim {
      let (x, y, z) = match axis {
        0 => (fixed, a, b),
        1 => (a, fixed, b),
        _ => (a, b, fixed),
      };
      if grid[grid_index(dim, x, y, z)] != 0.0 {
        return true;
      }
    }
  }
  false
}

/// Gather samples for a leaf: the node plus its 26 same-level neighbors,
/// filtered to the extent padded by `max(voxel, bin)/2 + avg spacing`.
fn gather_for_leaf(
  arena: &[NodeSlot],
  coord: NodeCoord,
  config: &TreeConfig,
  avg_spacing: f32,
) -> Vec<Sample> {
  let pad = config.voxel_size(coord.level).max(config.bin_size(coord.level)) * 0.5 + avg_spacing;
  let box_min = coord.min() - Vec3::splat(pad);
  let box_max = coord.max() + Vec3::splat(pad);

  let mut visited: Vec<usize> = Vec::with_capacity(27);
  let mut out = Vec::new();
  for dz in -1i32..=1 {
    for dy in -1i32..=1 {
      for dx in -1i32..=1 {
        let neighbor = if dx == 0 && dy == 0 && dz == 0 {
          Some(coord)
        } else {
          coord.neighbor(dx, dy, dz)
        };
        let Some(neighbor) = neighbor else { continue };
        // A coarser ancestor may cover several of the 27 coordinates.
        let (idx, _) = find_slot(arena, neighbor);
        if visited.contains(&idx) {
          continue;
        }
        visited.push(idx);
        gather_subtree(arena, idx, box_min, box_max, &mut out);
      }
    }
  }
  out
}

fn interpolate_leaf(
  arena: &mut Vec<NodeSlot>,
  idx: usize,
  config: &TreeConfig,
  dropped: &AtomicU64,
  ensure_neighbors: bool,
) {
  let coord = arena[idx].coord;
  let avg_spacing = {
    let state = arena[idx].state.get_mut().unwrap();
    state.payload.spacing_stats().map(|s| s.avg).unwrap_or(0.0)
  };

  let samples = gather_for_leaf(arena, coord, config, avg_spacing);
  let dim = config.brick_dim;
  let grid_cells = dim * dim * dim;
  let node_cells = config.node_grid_dim.pow(3);

  if samples.is_empty() {
    let state = arena[idx].state.get_mut().unwrap();
    state.empty = true;
    state.node_grid = Some(vec![0.0; node_cells]);
    state.voxel_grid = Some(vec![0.0; grid_cells]);
    return;
  }

  let node_grid = eval_grid(&samples, coord.min(), coord.size(), config.node_grid_dim);
  let voxel_grid = eval_grid(&samples, coord.min(), coord.size(), dim);

  {
    let state = arena[idx].state.get_mut().unwrap();
    state.empty = false;
    state.node_grid = Some(node_grid);
    state.voxel_grid = Some(voxel_grid);
  }

  if !ensure_neighbors {
    return;
  }

  // Any outward face carrying signal must have an interpolated same-level
  // neighbor, or sampling would jump across the node boundary. The
  // neighbor pass itself runs without further neighbor enforcement.
  const FACES: [(i32, i32, i32, usize, bool); 6] = [
    (-1, 0, 0, 0, false),
    (1, 0, 0, 0, true),
    (0, -1, 0, 1, false),
    (0, 1, 0, 1, true),
    (0, 0, -1, 2, false),
    (0, 0, 1, 2, true),
  ];
  for (dx, dy, dz, axis, positive) in FACES {
    let touched = {
      let state = arena[idx].state.get_mut().unwrap();
      match &state.voxel_grid {
        Some(grid) => face_has_signal(grid, dim, axis, positive),
        None => false,
      }
    };
    if !touched {
      continue;
    }
    let Some(neighbor) = arena[idx].coord.neighbor(dx, dy, dz) else {
      continue;
    };
    let neighbor_idx = ensure_slot(arena, neighbor, dropped);
    interpolate_slot(arena, neighbor_idx, config, dropped, false);
  }
}

fn interpolate_branch(
  arena: &mut Vec<NodeSlot>,
  idx: usize,
  config: &TreeConfig,
  dropped: &AtomicU64,
  ensure_neighbors: bool,
) {
  let first = match arena[idx].first_child() {
    Some(first) => first as usize,
    None => return,
  };
  for octant in 0..8 {
    interpolate_slot(arena, first + octant, config, dropped, ensure_neighbors);
  }

  let dim = config.node_grid_dim;
  let half = dim / 2;
  let mut node_grid = vec![0.0f32; dim * dim * dim];
  let mut all_empty = true;

  // Coarse grid: every parent cell averages a 2x2x2 block of the child
  // grid it overlaps.
  for octant in 0..8usize {
    let child = &arena[first + octant];
    let state = child.state.lock().unwrap();
    if !state.empty {
      all_empty = false;
    }
    let Some(child_grid) = &state.node_grid else {
      continue;
    };
    let ox = (octant & 1) * half;
    let oy = ((octant >> 1) & 1) * half;
    let oz = ((octant >> 2) & 1) * half;
    for z in 0..half {
      for y in 0..half {
        for x in 0..half {
          let mut sum = 0.0f32;
          for (bx, by, bz) in [
            (0, 0, 0),
            (1, 0, 0),
            (0, 1, 0),
            (1, 1, 0),
            (0, 0, 1),
            (1, 0, 1),
            (0, 1, 1),
            (1, 1, 1),
          ] {
            sum += child_grid[grid_index(dim, x * 2 + bx, y * 2 + by, z * 2 + bz)];
          }
          node_grid[grid_index(dim, ox + x, oy + y, oz + z)] = sum / 8.0;
        }
      }
    }
  }

  // Fine grid: trilinear lookups that recurse into the children.
  let coord = arena[idx].coord;
  let brick_dim = config.brick_dim;
  let cell = coord.size() / brick_dim as f32;
  let mut voxel_grid = vec![0.0f32; brick_dim * brick_dim * brick_dim];
  for z in 0..brick_dim {
    for y in 0..brick_dim {
      for x in 0..brick_dim {
        let at = coord.min()
          + Vec3::new(
            (x as f32 + 0.5) * cell,
            (y as f32 + 0.5) * cell,
            (z as f32 + 0.5) * cell,
          );
        voxel_grid[grid_index(brick_dim, x, y, z)] = lookup_value(arena, idx, at, brick_dim);
      }
    }
  }

  // Children are consumed: their clouds and grids are no longer needed.
  for octant in 0..8 {
    let state = arena[first + octant].state.get_mut().unwrap();
    state.payload.take();
    state.node_grid = None;
    state.voxel_grid = None;
  }

  let state = arena[idx].state.get_mut().unwrap();
  state.empty = all_empty;
  state.node_grid = Some(node_grid);
  state.voxel_grid = Some(voxel_grid);
}

/// Interpolate the node at `idx`. Idempotent: a populated voxel grid makes
/// this a no-op.
pub(crate) fn interpolate_slot(
  arena: &mut Vec<NodeSlot>,
  idx: usize,
  config: &TreeConfig,
  dropped: &AtomicU64,
  ensure_neighbors: bool,
) {
  {
    let state = arena[idx].state.get_mut().unwrap();
    if state.voxel_grid.is_some() {
      return;
    }
  }
  if arena[idx].is_leaf() {
    interpolate_leaf(arena, idx, config, dropped, ensure_neighbors);
  } else {
    interpolate_branch(arena, idx, config, dropped, ensure_neighbors);
  }
}

impl Octree {
  /// Build the node and voxel grids of the node at `coord`.
  ///
  /// Runs in the single-threaded maintenance phase, after insertion has
  /// quiesced. Idempotent; returns false when no exact node exists at
  /// `coord`.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
  pub fn interpolate(&mut self, coord: NodeCoord) -> bool {
    let (arena, config, dropped) = self.parts_mut();
    let (idx, exact) = find_slot(arena, coord);
    if !exact {
      return false;
    }
    interpolate_slot(arena, idx, config, dropped, true);
    true
  }

  /// Clone of the voxel grid at `coord`, if built.
  pub fn voxel_grid(&self, coord: NodeCoord) -> Option<Vec<f32>> {
    let arena = self.arena();
    let (idx, exact) = find_slot(&arena, coord);
    if !exact {
      return None;
    }
    let state = arena[idx].state.lock().unwrap();
    state.voxel_grid.clone()
  }

  /// Clone of the coarse node grid at `coord`, if built.
  pub fn node_grid(&self, coord: NodeCoord) -> Option<Vec<f32>> {
    let arena = self.arena();
    let (idx, exact) = find_slot(&arena, coord);
    if !exact {
      return None;
    }
    let state = arena[idx].state.lock().unwrap();
    state.node_grid.clone()
  }

  /// Whether interpolation marked the node at `coord` empty.
  pub fn is_empty_node(&self, coord: NodeCoord) -> Option<bool> {
    let arena = self.arena();
    let (idx, exact) = find_slot(&arena, coord);
    if !exact {
      return None;
    }
    let state = arena[idx].state.lock().unwrap();
    Some(state.empty)
  }
}

#[cfg(test)]
#[path = "interpolate_test.rs"]
mod interpolate_test;
