//! Run-wide configuration for the tree and the brick-pool assembler.
//!
//! Supplied once per run and treated as immutable afterwards. The
//! self-similarity constants have no derivation from first principles; they
//! are calibratable per instrument and deliberately exposed as plain fields.

/// Configuration for the scattered-point octree and the assembler.
#[derive(Clone, Debug)]
pub struct TreeConfig {
  /// Deepest level a leaf may split to. Level 0 is the root cube.
  pub max_depth: u32,

  /// Maximum samples a leaf accumulates before it re-bins or splits.
  pub leaf_sample_cap: usize,

  /// Resolution of the secondary re-binning grid per axis.
  pub rebin_dim: usize,

  /// Resolution of the exported voxel grid (brick) per axis.
  pub brick_dim: usize,

  /// Resolution of the coarse node grid per axis. Must be even so that
  /// 2x2x2 child blocks map onto parent octants.
  pub node_grid_dim: usize,

  /// Relative self-similarity threshold: data counts as locally flat when
  /// `stddev < |avg| * similarity_rel + similarity_floor`.
  pub similarity_rel: f32,

  /// Absolute floor of the self-similarity test, for near-zero averages.
  pub similarity_floor: f32,

  /// Mean expendable-score a branch's children must reach before the
  /// branch recombines back into a leaf.
  pub recombine_threshold: f32,

  /// Hard byte ceiling of the brick pool.
  pub pool_byte_budget: usize,

  /// The exported brick count is rounded up to a multiple of this, for
  /// downstream pool addressing.
  pub pool_block: u32,

  /// Maximum nodes gathered into one assembly cluster.
  pub cluster_max_nodes: usize,

  /// Maximum samples gathered into one assembly cluster.
  pub cluster_max_samples: usize,
}

impl TreeConfig {
  /// Side length of a node at the given level.
  #[inline]
  pub fn node_size(&self, level: u32) -> f32 {
    0.5_f32.powi(level as i32)
  }

  /// Side length of one voxel of a node's brick at the given level.
  #[inline]
  pub fn voxel_size(&self, level: u32) -> f32 {
    self.node_size(level) / self.brick_dim as f32
  }

  /// Side length of one cell of the re-binning grid at the given level.
  #[inline]
  pub fn bin_size(&self, level: u32) -> f32 {
    self.node_size(level) / self.rebin_dim as f32
  }

  /// Number of bricks the pool byte budget can hold.
  #[inline]
  pub fn pool_capacity_bricks(&self) -> u32 {
    let brick_bytes = self.brick_dim * self.brick_dim * self.brick_dim * 4;
    (self.pool_byte_budget / brick_bytes) as u32
  }

  /// The average-relative-plus-floor self-similarity test.
  #[inline]
  pub fn is_similar(&self, avg: f32, stddev: f32) -> bool {
    stddev < avg.abs() * self.similarity_rel + self.similarity_floor
  }
}

impl Default for TreeConfig {
  fn default() -> Self {
    Self {
      max_depth: 12,
      leaf_sample_cap: 64,
      rebin_dim: 8,
      brick_dim: 8,
      node_grid_dim: 4,
      similarity_rel: 0.25,
      similarity_floor: 1e-4,
      recombine_threshold: 0.75,
      pool_byte_budget: 256 << 20,
      pool_block: 16,
      cluster_max_nodes: 256,
      cluster_max_samples: 1 << 18,
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
