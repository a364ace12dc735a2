//! Breadth-first brick assembly.
//!
//! Walks a conceptual complete octree over the unit cube level by level,
//! gathers the merged samples around each node, evaluates bricks through
//! the batched kernel and appends the populated ones to the pool. The
//! output is the flat metadata + pool pair a renderer uploads as-is.
//!
//! Nodes of one level are processed in clusters bounded by
//! `cluster_max_nodes` and `cluster_max_samples`; cancellation is observed
//! only between clusters and levels, so a partial result always covers
//! whole levels.

use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use web_time::Instant;

use crate::config::TreeConfig;
use crate::events::{emit, EventSender, ProgressEvent};
use crate::octree::{NodeCoord, Octree};
use crate::sample::Sample;

use super::batch::{interpolate_bricks, BrickJob, BrickResult};
use super::pool::BrickPool;

/// Sentinel for a leaf's child index.
pub const NO_CHILDREN: u32 = u32::MAX;
/// Sentinel for an unpopulated node's pool coordinate.
pub const NO_BRICK: u32 = u32::MAX;

/// One node of the flattened output octree, breadth-first by level.
/// `child_index` addresses the first of 8 contiguous siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrickNode {
  pub is_leaf: bool,
  pub is_populated: bool,
  pub child_index: u32,
  pub pool_coordinate: u32,
}

impl BrickNode {
  fn unpopulated_leaf() -> Self {
    Self {
      is_leaf: true,
      is_populated: false,
      child_index: NO_CHILDREN,
      pool_coordinate: NO_BRICK,
    }
  }
}

/// How the assembly run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyOutcome {
  Completed,
  /// The pool filled up mid-walk; the output covers everything written up
  /// to and including the level where capacity ran out.
  PoolExhausted { level: u32 },
  /// Cancelled between clusters; the output covers the last completed
  /// level.
  Cancelled { levels_completed: u32 },
}

/// Counters for one assembly run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyStats {
  pub bricks_written: u32,
  pub levels_completed: u32,
  pub total_us: u64,
}

/// Flattened octree metadata plus the brick pool it points into.
#[derive(Debug)]
pub struct AssemblyOutput {
  pub nodes: Vec<BrickNode>,
  pub pool: BrickPool,
  pub outcome: AssemblyOutcome,
  pub stats: AssemblyStats,
}

/// Per-run mutable state threaded through the level walk.
struct AssemblyContext<'a> {
  config: &'a TreeConfig,
  pool: BrickPool,
  nodes: Vec<BrickNode>,
  sink: Option<&'a EventSender>,
  exhausted: bool,
  exhausted_level: u32,
}

impl<'a> AssemblyContext<'a> {
  fn new(config: &'a TreeConfig, sink: Option<&'a EventSender>) -> Self {
    Self {
      config,
      pool: BrickPool::new(
        config.brick_dim,
        config.pool_capacity_bricks(),
        config.pool_block,
      ),
      nodes: Vec::new(),
      sink,
      exhausted: false,
      exhausted_level: 0,
    }
  }

  /// Record one evaluated node, appending its brick when populated.
  /// Returns true when the node stays a branch and its 8 children should
  /// be enqueued for the next level.
  fn record(
    &mut self,
    coord: NodeCoord,
    result: &BrickResult,
    remaining_levels: u32,
    child_index: u32,
  ) -> bool {
    if self.exhausted {
      self.nodes.push(BrickNode::unpopulated_leaf());
      return false;
    }

    let populated = result.sum > 0.0;
    let pool_coordinate = if populated {
      match self.pool.try_push(&result.values) {
        Some(coordinate) => coordinate,
        None => {
          // Capacity ran out: report once, then degrade the rest of the
          // level to unpopulated leaves.
          self.exhausted = true;
          self.exhausted_level = coord.level;
          emit(
            self.sink,
            ProgressEvent::PoolExhausted {
              level: coord.level,
              bricks_written: self.pool.len_bricks(),
            },
          );
          self.nodes.push(BrickNode::unpopulated_leaf());
          return false;
        }
      }
    } else {
      NO_BRICK
    };

    let count = result.values.len() as f64;
    let mean = result.sum / count;
    let stddev = (result.variance.max(0.0)).sqrt();
    let uniform = self.config.is_similar(mean as f32, stddev as f32);

    // Stop early on uniform bricks only near the bottom of the walk;
    // higher up a flat brick may still hide structure below.
    let is_leaf = !populated
      || remaining_levels == 0
      || (uniform && remaining_levels <= UNIFORM_CUTOFF_LEVELS);

    self.nodes.push(BrickNode {
      is_leaf,
      is_populated: populated,
      child_index: if is_leaf { NO_CHILDREN } else { child_index },
      pool_coordinate,
    });
    !is_leaf
  }

  /// Convert any branch whose children were never emitted into a leaf.
  /// Applied after an early stop so the metadata never dangles.
  fn seal_dangling_branches(&mut self) {
    let len = self.nodes.len() as u32;
    for node in &mut self.nodes {
      if !node.is_leaf && node.child_index >= len {
        node.is_leaf = true;
        node.child_index = NO_CHILDREN;
      }
    }
  }
}

/// A uniform brick becomes a leaf only with this few levels left.
const UNIFORM_CUTOFF_LEVELS: u32 = 2;

/// Gather radius for one level, seeded from the producer-supplied search
/// radius bounds and never smaller than half a voxel.
fn level_radius(config: &TreeConfig, level: u32, bounds: Option<(f32, f32)>) -> f32 {
  let half_voxel = config.voxel_size(level) * 0.5;
  match bounds {
    Some((lo, hi)) => half_voxel + (hi * config.node_size(level)).clamp(lo, hi),
    None => half_voxel + config.bin_size(level),
  }
}

/// One cluster of same-level nodes with their gathered samples flattened
/// into a single slice.
#[derive(Default)]
struct Cluster {
  coords: Vec<NodeCoord>,
  samples: Vec<Sample>,
  jobs: Vec<BrickJob>,
}

/// Build one cluster from the head of `queue`, stopping at the node and
/// gathered-sample caps. Clusters are built one at a time so only a single
/// cluster's gather is ever resident; the caps bound peak memory, not just
/// batch size.
fn next_cluster(tree: &Octree, queue: &[NodeCoord], radius: f32) -> Cluster {
  let config = tree.config();
  let mut cluster = Cluster::default();

  for coord in queue {
    let min = coord.min() - Vec3::splat(radius);
    let max = coord.max() + Vec3::splat(radius);
    let gathered = tree.gather_in_box(min, max);

    cluster.jobs.push(BrickJob {
      sample_offset: cluster.samples.len(),
      sample_count: gathered.len(),
      min: coord.min(),
      size: coord.size(),
    });
    cluster.samples.extend(gathered);
    cluster.coords.push(*coord);

    if cluster.coords.len() >= config.cluster_max_nodes
      || cluster.samples.len() >= config.cluster_max_samples
    {
      break;
    }
  }
  cluster
}

/// Flatten the merged tree into breadth-first brick metadata plus a brick
/// pool, `level_count` levels deep.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(level_count)))]
pub fn assemble(
  tree: &mut Octree,
  level_count: u32,
  sink: Option<&EventSender>,
  cancel: &AtomicBool,
) -> AssemblyOutput {
  let started = Instant::now();
  let config = tree.config().clone();
  let bounds = tree.search_radius_bounds();

  // Surface insertion-time data-quality drops to the consumer; the counter
  // alone is invisible without the tracing feature.
  let dropped = tree.dropped_samples();
  if dropped > 0 {
    emit(
      sink,
      ProgressEvent::Warning(format!(
        "{} samples fell outside the unit cube and were dropped",
        dropped
      )),
    );
  }

  let mut ctx = AssemblyContext::new(&config, sink);
  let mut queue: Vec<NodeCoord> = vec![NodeCoord::ROOT];
  let mut outcome = AssemblyOutcome::Completed;
  let mut levels_completed = 0u32;

  'levels: for level in 0..level_count {
    if queue.is_empty() {
      break;
    }
    let level_node_start = ctx.nodes.len();
    let level_brick_start = ctx.pool.len_bricks();
    let remaining_levels = level_count - 1 - level;
    let radius = level_radius(&config, level, bounds);

    // Children of this level begin right after it in the flat layout.
    let next_base = (ctx.nodes.len() + queue.len()) as u32;
    let mut spawned = 0u32;
    let mut next_queue: Vec<NodeCoord> = Vec::new();
    let mut processed = 0usize;
    let level_total = queue.len();

    while processed < level_total {
      if cancel.load(Ordering::Relaxed) {
        // Unwind the partial level; the output keeps whole levels only.
        ctx.nodes.truncate(level_node_start);
        ctx.pool.truncate(level_brick_start);
        outcome = AssemblyOutcome::Cancelled { levels_completed };
        break 'levels;
      }

      let cluster = next_cluster(tree, &queue[processed..], radius);
      let results = interpolate_bricks(&cluster.samples, &cluster.jobs, config.brick_dim);
      for (coord, result) in cluster.coords.iter().zip(&results) {
        let child_index = next_base + 8 * spawned;
        if ctx.record(*coord, result, remaining_levels, child_index) {
          spawned += 1;
          for octant in 0u8..8 {
            next_queue.push(coord.child(octant));
          }
        }
      }

      processed += cluster.coords.len();
      emit(
        sink,
        ProgressEvent::LevelProgress {
          level,
          percent: processed as f32 / level_total as f32,
        },
      );
    }

    emit(
      sink,
      ProgressEvent::MemoryUsage {
        used_bytes: ctx.pool.used_bytes() as usize,
        budget_bytes: config.pool_byte_budget,
      },
    );
    levels_completed = level + 1;

    if ctx.exhausted {
      outcome = AssemblyOutcome::PoolExhausted {
        level: ctx.exhausted_level,
      };
      break;
    }
    queue = next_queue;
  }

  ctx.seal_dangling_branches();
  let bricks_written = ctx.pool.len_bricks();
  ctx.pool.finalize();

  AssemblyOutput {
    nodes: ctx.nodes,
    pool: ctx.pool,
    outcome,
    stats: AssemblyStats {
      bricks_written,
      levels_completed,
      total_us: started.elapsed().as_micros() as u64,
    },
  }
}

#[cfg(test)]
#[path = "assemble_test.rs"]
mod assemble_test;
