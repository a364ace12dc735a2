//! Squeeze and recombination - the per-node refinement verdicts.
//!
//! After insertion quiesces, every leaf is asked whether further
//! refinement is justified (`squeeze`), and branches whose children all
//! turned out statistically self-similar are collapsed back into leaves
//! (`recombine`). Node lifecycle:
//!
//! ```text
//! unresolved-leaf -> split -> branch -> recombine -> leaf
//! unresolved-leaf -> squeeze(no-op) -> resolved-leaf (terminal)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use crate::config::TreeConfig;
use crate::sample::Sample;

use super::coord::NodeCoord;
use super::interpolate::{grid_index, interpolate_slot};
use super::payload::LeafPayload;
use super::tree::{find_slot, split_slot, NodeSlot, Octree, NO_CHILD};

/// Mean and standard deviation of a slice of values.
fn mean_stddev(values: &[f32]) -> (f32, f32) {
  if values.is_empty() {
    return (0.0, 0.0);
  }
  let n = values.len() as f64;
  let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
  let var = values
    .iter()
    .map(|v| {
      let d = *v as f64 - mean;
      d * d
    })
    .sum::<f64>()
    / n;
  (mean as f32, var.sqrt() as f32)
}

/// Weight of the bin nearest to each cell center of the secondary grid.
///
/// This is the statistic squeeze uses to judge local flatness: if the
/// nearest-neighbor field barely varies, refining further only resolves
/// noise.
fn nearest_neighbor_grid(samples: &[Sample], coord: NodeCoord, dim: usize) -> Vec<f32> {
  let cell = coord.size() / dim as f32;
  let min = coord.min();
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
        let mut best = f32::INFINITY;
        let mut weight = 0.0f32;
        for sample in samples {
          let dist = (sample.position - at).length_squared();
          if dist < best {
            best = dist;
            weight = sample.weight;
          }
        }
        grid[grid_index(dim, x, y, z)] = weight;
      }
    }
  }
  grid
}

/// Decide the fate of a leaf. Returns true when the leaf split.
fn squeeze_leaf(
  arena: &mut Vec<NodeSlot>,
  idx: usize,
  config: &TreeConfig,
  dropped: &AtomicU64,
) -> bool {
  let coord = arena[idx].coord;
  let verdict = {
    let state = arena[idx].state.get_mut().unwrap();
    if state.resolved {
      return false;
    }
    if state.payload.is_empty() {
      state.resolved = true;
      return false;
    }

    let stats = match state.payload.spacing_stats() {
      Some(stats) => stats,
      None => {
        state.resolved = true;
        return false;
      }
    };
    let voxel = config.voxel_size(coord.level);
    if voxel <= stats.min {
      // The voxels already resolve the finest local spacing.
      state.resolved = true;
      return false;
    }

    let nn_grid = nearest_neighbor_grid(state.payload.samples(), coord, config.rebin_dim);
    let (avg, stddev) = mean_stddev(&nn_grid);
    config.is_similar(avg, stddev)
  };

  if verdict || coord.level >= config.max_depth {
    // Locally flat, or nowhere finer to go.
    let state = arena[idx].state.get_mut().unwrap();
    state.resolved = true;
    false
  } else {
    split_slot(arena, idx, dropped);
    true
  }
}

/// Expendable score of one child: the fraction of its 2x2x2 node-grid
/// blocks that are fully empty or pass the self-similarity test.
fn expendable_score(node_grid: &[f32], dim: usize, config: &TreeConfig) -> f32 {
  let half = dim / 2;
  let mut expendable = 0usize;
  let mut total = 0usize;
  let mut block = [0.0f32; 8];
  for bz in 0..half {
    for by in 0..half {
      for bx in 0..half {
        for (i, (ox, oy, oz)) in [
          (0, 0, 0),
          (1, 0, 0),
          (0, 1, 0),
          (1, 1, 0),
          (0, 0, 1),
          (1, 0, 1),
          (0, 1, 1),
          (1, 1, 1),
        ]
        .into_iter()
        .enumerate()
        {
          block[i] = node_grid[grid_index(dim, bx * 2 + ox, by * 2 + oy, bz * 2 + oz)];
        }
        total += 1;
        let (avg, stddev) = mean_stddev(&block);
        if block.iter().all(|v| *v == 0.0) || config.is_similar(avg, stddev) {
          expendable += 1;
        }
      }
    }
  }
  if total == 0 {
    0.0
  } else {
    expendable as f32 / total as f32
  }
}

/// Collapse a branch of self-similar leaf children back into one leaf.
/// Returns true when the branch collapsed.
fn recombine_branch(
  arena: &mut Vec<NodeSlot>,
  idx: usize,
  config: &TreeConfig,
  dropped: &AtomicU64,
) -> bool {
  let first = match arena[idx].first_child() {
    Some(first) => first as usize,
    None => return false,
  };
  if (0..8).any(|octant| !arena[first + octant].is_leaf()) {
    return false;
  }

  // Child node grids are needed for the verdict; build missing ones
  // without triggering the neighbor-ensure pass.
  for octant in 0..8 {
    let missing = {
      let state = arena[first + octant].state.get_mut().unwrap();
      state.node_grid.is_none()
    };
    if missing {
      interpolate_slot(arena, first + octant, config, dropped, false);
    }
  }

  let mut score_sum = 0.0f32;
  for octant in 0..8 {
    let state = arena[first + octant].state.get_mut().unwrap();
    let score = match &state.node_grid {
      Some(grid) => expendable_score(grid, config.node_grid_dim, config),
      None => 0.0,
    };
    score_sum += score;
  }
  if score_sum / 8.0 < config.recombine_threshold {
    return false;
  }

  // Revert to a leaf holding the union of the children's bins.
  let mut union = Vec::new();
  for octant in 0..8 {
    let state = arena[first + octant].state.get_mut().unwrap();
    union.extend(state.payload.take());
    state.clear_grids();
    state.resolved = false;
  }

  let coord = arena[idx].coord;
  let over_cap = union.len() > config.leaf_sample_cap;
  let state = arena[idx].state.get_mut().unwrap();
  state.payload = LeafPayload::Bins(union);
  if over_cap {
    state.payload.rebin(&coord, config.rebin_dim);
  }
  state.clear_grids();
  state.resolved = false;
  arena[idx].first_child.store(NO_CHILD, Ordering::Release);
  true
}

/// Recursive bottom-up squeeze: leaves get their verdicts (possibly
/// splitting), then branches whose children all ended up leaves attempt
/// recombination.
fn squeeze_subtree(arena: &mut Vec<NodeSlot>, idx: usize, config: &TreeConfig, dropped: &AtomicU64) {
  if arena[idx].is_leaf() {
    if squeeze_leaf(arena, idx, config, dropped) {
      // Fresh children inherit the verdict walk.
      squeeze_subtree(arena, idx, config, dropped);
    }
    return;
  }

  let first = match arena[idx].first_child() {
    Some(first) => first as usize,
    None => return,
  };
  for octant in 0..8 {
    squeeze_subtree(arena, first + octant, config, dropped);
  }
  recombine_branch(arena, idx, config, dropped);
}

impl Octree {
  /// Run the squeeze/recombine maintenance pass over the whole tree.
  ///
  /// Single-threaded; runs only after concurrent insertion has quiesced.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
  pub fn squeeze_pass(&mut self) {
    let (arena, config, dropped) = self.parts_mut();
    squeeze_subtree(arena, 0, config, dropped);
  }

  /// Whether the leaf at `coord` is marked maximally resolved.
  pub fn is_resolved(&self, coord: NodeCoord) -> Option<bool> {
    let arena = self.arena();
    let (idx, exact) = find_slot(&arena, coord);
    if !exact {
      return None;
    }
    let state = arena[idx].state.lock().unwrap();
    Some(state.resolved)
  }
}

#[cfg(test)]
#[path = "squeeze_test.rs"]
mod squeeze_test;
