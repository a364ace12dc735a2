use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use glam::Vec3;

use crate::config::TreeConfig;
use crate::events::ProgressEvent;
use crate::octree::Octree;
use crate::sample::Sample;

use super::*;

fn config() -> TreeConfig {
  TreeConfig {
    brick_dim: 4,
    // Disable the uniformity cutoff so the walk shape is predictable.
    similarity_rel: 0.0,
    similarity_floor: 0.0,
    pool_block: 1,
    cluster_max_nodes: 4,
    ..Default::default()
  }
}

/// Tree filled with a dense uniform lattice.
fn uniform_tree(config: TreeConfig, weight: f32) -> Octree {
  let tree = Octree::new(config);
  let step = 1.0 / 8.0;
  for i in 0..8 {
    for j in 0..8 {
      for k in 0..8 {
        let p = Vec3::new(
          (i as f32 + 0.5) * step,
          (j as f32 + 0.5) * step,
          (k as f32 + 0.5) * step,
        );
        tree.insert(Sample::new(p, weight, step));
      }
    }
  }
  tree
}

/// Every branch must address 8 in-range children and every populated node
/// an in-range brick.
fn assert_metadata_consistent(output: &AssemblyOutput) {
  for node in &output.nodes {
    if node.is_leaf {
      assert_eq!(node.child_index, NO_CHILDREN);
    } else {
      assert!(node.child_index as usize + 8 <= output.nodes.len());
    }
    if node.is_populated {
      assert!(node.pool_coordinate < output.stats.bricks_written);
    } else {
      assert_eq!(node.pool_coordinate, NO_BRICK);
    }
  }
}

#[test]
fn test_two_level_walk_is_breadth_first() {
  let mut tree = uniform_tree(config(), 1.0);
  let cancel = AtomicBool::new(false);

  let output = assemble(&mut tree, 2, None, &cancel);

  assert_eq!(output.outcome, AssemblyOutcome::Completed);
  assert_eq!(output.nodes.len(), 9);
  assert!(!output.nodes[0].is_leaf);
  assert_eq!(output.nodes[0].child_index, 1);
  for node in &output.nodes[1..] {
    assert!(node.is_leaf);
    assert!(node.is_populated);
  }
  // Bricks are appended in node order.
  let coords: Vec<u32> = output.nodes.iter().map(|n| n.pool_coordinate).collect();
  for pair in coords.windows(2) {
    assert!(pair[0] < pair[1]);
  }
  assert_eq!(output.stats.bricks_written, 9);
  assert_eq!(output.stats.levels_completed, 2);
  assert_metadata_consistent(&output);
}

/// A uniform brick with at most two levels remaining stops the descent.
#[test]
fn test_uniform_region_stops_early() {
  let config = TreeConfig {
    brick_dim: 4,
    pool_block: 1,
    ..Default::default()
  };
  let mut tree = uniform_tree(config, 1.0);
  let cancel = AtomicBool::new(false);

  let output = assemble(&mut tree, 4, None, &cancel);

  assert_eq!(output.outcome, AssemblyOutcome::Completed);
  // Root descends once (3 levels left), the uniform children do not.
  assert_eq!(output.nodes.len(), 9);
  assert!(!output.nodes[0].is_leaf);
  for node in &output.nodes[1..] {
    assert!(node.is_leaf);
  }
  assert_metadata_consistent(&output);
}

/// Regions with no samples in gather range become unpopulated leaves with
/// no brick.
#[test]
fn test_empty_region_is_unpopulated() {
  let tree = Octree::new(config());
  // Samples only near the origin corner.
  for i in 0..4 {
    let t = 0.02 + 0.04 * i as f32;
    tree.insert(Sample::new(Vec3::new(t, t, t), 1.0, 0.05));
  }
  let mut tree = tree;
  let cancel = AtomicBool::new(false);

  let output = assemble(&mut tree, 2, None, &cancel);

  assert_eq!(output.outcome, AssemblyOutcome::Completed);
  assert!(output.nodes[0].is_populated);
  let unpopulated: Vec<&BrickNode> = output.nodes[1..]
    .iter()
    .filter(|n| !n.is_populated)
    .collect();
  assert!(!unpopulated.is_empty());
  for node in &unpopulated {
    assert!(node.is_leaf);
    assert_eq!(node.pool_coordinate, NO_BRICK);
  }
  assert_metadata_consistent(&output);
}

/// Scenario: the pool holds exactly three bricks. Assembly writes three,
/// reports exhaustion exactly once, degrades the rest of the level to
/// unpopulated leaves, and the partial result stays consistent.
#[test]
fn test_pool_exhaustion_mid_level() {
  let brick_bytes = 4 * 4 * 4 * 4;
  let config = TreeConfig {
    pool_byte_budget: 3 * brick_bytes,
    ..config()
  };
  let mut tree = uniform_tree(config, 1.0);

  let (tx, rx) = crossbeam_channel::unbounded();
  let cancel = AtomicBool::new(false);
  let output = assemble(&mut tree, 3, Some(&tx), &cancel);
  drop(tx);

  assert_eq!(output.outcome, AssemblyOutcome::PoolExhausted { level: 1 });
  assert_eq!(output.stats.bricks_written, 3);
  assert_eq!(output.pool.len_bricks(), 3);
  // Levels 0 and 1 are present, level 2 is not.
  assert_eq!(output.nodes.len(), 9);
  assert_eq!(output.stats.levels_completed, 2);
  // Nothing dangles into the missing level.
  for node in &output.nodes[1..] {
    assert!(node.is_leaf);
  }
  assert_metadata_consistent(&output);

  let exhausted: Vec<ProgressEvent> = rx
    .iter()
    .filter(|e| matches!(e, ProgressEvent::PoolExhausted { .. }))
    .collect();
  assert_eq!(
    exhausted,
    vec![ProgressEvent::PoolExhausted {
      level: 1,
      bricks_written: 3
    }]
  );
}

#[test]
fn test_cancel_before_start_yields_empty_result() {
  let mut tree = uniform_tree(config(), 1.0);
  let cancel = AtomicBool::new(true);

  let output = assemble(&mut tree, 3, None, &cancel);

  assert_eq!(
    output.outcome,
    AssemblyOutcome::Cancelled {
      levels_completed: 0
    }
  );
  assert!(output.nodes.is_empty());
  assert_eq!(output.stats.bricks_written, 0);
}

/// Cancelling after the first level keeps that level, sealed, and nothing
/// from the level that was underway.
#[test]
fn test_cancel_retains_completed_levels() {
  let mut tree = uniform_tree(config(), 1.0);
  let cancel = Arc::new(AtomicBool::new(false));

  // Rendezvous channel: the assembler blocks on each event until the
  // receiver takes it, so flipping the flag on the first event lands
  // before the next cluster begins.
  let (tx, rx) = crossbeam_channel::bounded(0);
  let receiver = {
    let cancel = Arc::clone(&cancel);
    std::thread::spawn(move || {
      if rx.recv().is_ok() {
        cancel.store(true, std::sync::atomic::Ordering::Relaxed);
      }
      while rx.recv().is_ok() {}
    })
  };

  let output = assemble(&mut tree, 3, Some(&tx), &cancel);
  drop(tx);
  receiver.join().unwrap();

  assert_eq!(
    output.outcome,
    AssemblyOutcome::Cancelled {
      levels_completed: 1
    }
  );
  // Only the root level survives, sealed into a leaf.
  assert_eq!(output.nodes.len(), 1);
  assert!(output.nodes[0].is_leaf);
  assert!(output.nodes[0].is_populated);
  assert_eq!(output.pool.len_bricks(), 1);
  assert_metadata_consistent(&output);
}

/// Each cluster emits one progress event, so the event count shows how the
/// caps partition a level. Both caps must keep individual clusters small
/// regardless of the level's total gather.
#[test]
fn test_cluster_caps_bound_batch_size() {
  let level_one_clusters = |config: TreeConfig| -> usize {
    let mut tree = uniform_tree(config, 1.0);
    let (tx, rx) = crossbeam_channel::unbounded();
    let cancel = AtomicBool::new(false);
    assemble(&mut tree, 2, Some(&tx), &cancel);
    drop(tx);
    rx.iter()
      .filter(|e| matches!(e, ProgressEvent::LevelProgress { level: 1, .. }))
      .count()
  };

  // 8 nodes at two per cluster.
  let by_nodes = TreeConfig {
    cluster_max_nodes: 2,
    ..config()
  };
  assert_eq!(level_one_clusters(by_nodes), 4);

  // The sample cap trips after every node's gather.
  let by_samples = TreeConfig {
    cluster_max_samples: 1,
    ..config()
  };
  assert_eq!(level_one_clusters(by_samples), 8);
}

/// Samples dropped during insertion surface as a warning event on the next
/// assembly, exactly once.
#[test]
fn test_dropped_samples_reported_as_warning() {
  let tree = uniform_tree(config(), 1.0);
  tree.insert(Sample::new(Vec3::new(1.5, 0.5, 0.5), 1.0, 0.1));
  tree.insert(Sample::new(Vec3::new(-0.2, 0.5, 0.5), 1.0, 0.1));
  assert_eq!(tree.dropped_samples(), 2);
  let mut tree = tree;

  let (tx, rx) = crossbeam_channel::unbounded();
  let cancel = AtomicBool::new(false);
  assemble(&mut tree, 2, Some(&tx), &cancel);
  drop(tx);

  let warnings: Vec<String> = rx
    .iter()
    .filter_map(|e| match e {
      ProgressEvent::Warning(text) => Some(text),
      _ => None,
    })
    .collect();
  assert_eq!(warnings.len(), 1);
  assert!(warnings[0].contains("2 samples"));
}

/// A clean run emits no warnings.
#[test]
fn test_no_warning_without_drops() {
  let mut tree = uniform_tree(config(), 1.0);
  let (tx, rx) = crossbeam_channel::unbounded();
  let cancel = AtomicBool::new(false);
  assemble(&mut tree, 2, Some(&tx), &cancel);
  drop(tx);

  assert!(!rx
    .iter()
    .any(|e| matches!(e, ProgressEvent::Warning(_))));
}

#[test]
fn test_pool_rounds_to_block_multiple() {
  let config = TreeConfig {
    pool_block: 16,
    ..config()
  };
  let mut tree = uniform_tree(config, 1.0);
  let cancel = AtomicBool::new(false);

  let output = assemble(&mut tree, 2, None, &cancel);

  assert_eq!(output.stats.bricks_written, 9);
  assert_eq!(output.pool.len_bricks(), 16);
  assert_eq!(output.pool.data().len(), 16 * 64);
}
