use glam::Vec3;

use crate::config::TreeConfig;
use crate::sample::Sample;

use super::*;

fn config() -> TreeConfig {
  TreeConfig {
    max_depth: 4,
    leaf_sample_cap: 64,
    rebin_dim: 4,
    brick_dim: 8,
    node_grid_dim: 4,
    ..Default::default()
  }
}

#[test]
fn test_empty_leaf_becomes_resolved() {
  let mut tree = Octree::new(config());
  tree.squeeze_pass();
  assert_eq!(tree.is_resolved(NodeCoord::ROOT), Some(true));
  assert_eq!(tree.node_count(), 1);
}

/// Spacing at or above the voxel size means the node already resolves its
/// data; squeeze marks it terminal without splitting.
#[test]
fn test_adequate_resolution_becomes_resolved() {
  let config = config();
  let voxel = config.voxel_size(0);
  let mut tree = Octree::new(config);
  tree.insert(Sample::new(Vec3::splat(0.3), 1.0, voxel * 2.0));
  tree.insert(Sample::new(Vec3::splat(0.7), 9.0, voxel * 3.0));

  tree.squeeze_pass();
  assert_eq!(tree.is_resolved(NodeCoord::ROOT), Some(true));
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(true));
}

/// Scenario: a depth-capped leaf crammed with fine samples of near-uniform
/// weight. The nearest-neighbor field is flat, so squeeze declares it
/// resolved rather than wishing for a split it cannot have.
#[test]
fn test_uniform_overfilled_leaf_resolves_by_similarity() {
  let config = TreeConfig {
    max_depth: 0,
    leaf_sample_cap: 16,
    rebin_dim: 4,
    brick_dim: 8,
    node_grid_dim: 4,
    ..Default::default()
  };
  let mut tree = Octree::new(config);

  // Dense lattice, weights within a few percent of each other.
  for i in 0..5 {
    for j in 0..5 {
      for k in 0..5 {
        let p = Vec3::new(
          0.1 + 0.2 * i as f32,
          0.1 + 0.2 * j as f32,
          0.1 + 0.2 * k as f32,
        );
        let wobble = ((i + j + k) % 3) as f32 * 0.01;
        tree.insert(Sample::new(p, 1.0 + wobble, 0.01));
      }
    }
  }
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(true));

  tree.squeeze_pass();
  assert_eq!(tree.is_resolved(NodeCoord::ROOT), Some(true));
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(true));
}

/// A recombined leaf that later receives contrasting data splits again on
/// the next pass, and the fresh children get verdicts in the same pass.
#[test]
fn test_squeeze_splits_and_descends() {
  let config = TreeConfig {
    max_depth: 1,
    leaf_sample_cap: 1200,
    rebin_dim: 4,
    brick_dim: 8,
    node_grid_dim: 4,
    recombine_threshold: 0.75,
    ..Default::default()
  };
  let mut tree = Octree::new(config);

  // Uniform lattice: splits on insert, then the first pass collapses it.
  let step = 1.0 / 8.0;
  for i in 0..8 {
    for j in 0..8 {
      for k in 0..8 {
        let p = Vec3::new(
          (i as f32 + 0.5) * step,
          (j as f32 + 0.5) * step,
          (k as f32 + 0.5) * step,
        );
        tree.insert(Sample::new(p, 2.0, 0.07));
      }
    }
  }
  tree.squeeze_pass();
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(true));

  // Contrasting outliers on the secondary-grid cell centers break the
  // nearest-neighbor flatness test.
  for i in 0..4 {
    for j in 0..4 {
      for k in 0..4 {
        let p = Vec3::new(
          0.125 + 0.25 * i as f32,
          0.125 + 0.25 * j as f32,
          0.125 + 0.25 * k as f32,
        );
        let w = if (i + j + k) % 2 == 0 { 500.0 } else { 0.01 };
        tree.insert(Sample::new(p, w, 0.3));
      }
    }
  }
  // More outliers on the lattice itself, one per future node-grid block,
  // so the re-split children stay dissimilar too.
  for i in 0..4 {
    for j in 0..4 {
      for k in 0..4 {
        let p = Vec3::new(
          0.0625 + 0.25 * i as f32,
          0.0625 + 0.25 * j as f32,
          0.0625 + 0.25 * k as f32,
        );
        tree.insert(Sample::new(p, 500.0, 0.3));
      }
    }
  }

  tree.squeeze_pass();

  // The leaf split again and every new leaf carries a verdict.
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(false));
  for octant in 0u8..8 {
    let child = NodeCoord::ROOT.child(octant);
    assert_eq!(tree.is_leaf(child), Some(true));
    assert_eq!(tree.is_resolved(child), Some(true));
  }
}

/// Recombination: a branch whose eight children all sampled the same flat
/// field collapses back into one leaf holding the union of the bins.
#[test]
fn test_recombine_collapses_uniform_branch() {
  let config = TreeConfig {
    max_depth: 1,
    leaf_sample_cap: 64,
    rebin_dim: 4,
    brick_dim: 8,
    node_grid_dim: 4,
    recombine_threshold: 0.75,
    ..Default::default()
  };
  let mut tree = Octree::new(config);

  // A dense uniform lattice; the first sample's fine spacing splits the
  // root, then the rest distribute over the eight children.
  let step = 1.0 / 8.0;
  for i in 0..8 {
    for j in 0..8 {
      for k in 0..8 {
        let p = Vec3::new(
          (i as f32 + 0.5) * step,
          (j as f32 + 0.5) * step,
          (k as f32 + 0.5) * step,
        );
        tree.insert(Sample::new(p, 2.0, 0.07));
      }
    }
  }
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(false));
  let before = tree.sample_count();

  tree.squeeze_pass();

  // The branch collapsed; the root leaf holds the merged payload.
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(true));
  assert_eq!(tree.children_of(NodeCoord::ROOT), None);
  let held = tree.samples_at(NodeCoord::ROOT).unwrap();
  assert!(!held.is_empty());
  assert_eq!(tree.sample_count(), before);
}

/// A branch whose children carry a high-contrast checkerboard field does
/// not collapse.
#[test]
fn test_recombine_keeps_contrasting_branch() {
  let config = TreeConfig {
    max_depth: 1,
    leaf_sample_cap: 64,
    rebin_dim: 4,
    brick_dim: 8,
    node_grid_dim: 4,
    recombine_threshold: 0.75,
    ..Default::default()
  };
  let mut tree = Octree::new(config);

  let step = 1.0 / 8.0;
  for i in 0..8 {
    for j in 0..8 {
      for k in 0..8 {
        let p = Vec3::new(
          (i as f32 + 0.5) * step,
          (j as f32 + 0.5) * step,
          (k as f32 + 0.5) * step,
        );
        let w = if (i + j + k) % 2 == 0 { 10.0 } else { 0.01 };
        tree.insert(Sample::new(p, w, 0.07));
      }
    }
  }
  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(false));

  tree.squeeze_pass();

  assert_eq!(tree.is_leaf(NodeCoord::ROOT), Some(false));
}

#[test]
fn test_squeeze_pass_is_idempotent() {
  let mut tree = Octree::new(config());
  tree.insert(Sample::new(Vec3::splat(0.4), 1.0, 0.3));

  tree.squeeze_pass();
  let nodes = tree.node_count();
  tree.squeeze_pass();
  assert_eq!(tree.node_count(), nodes);
  assert_eq!(tree.is_resolved(NodeCoord::ROOT), Some(true));
}
