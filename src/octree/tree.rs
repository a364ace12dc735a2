//! Octree - arena-backed scattered-point index with concurrent insertion.
//!
//! Nodes live in a flat arena addressed by index; the 8 children of a
//! branch occupy contiguous slots starting at the branch's first-child
//! index. Slots never move once allocated, so an index stays valid for the
//! lifetime of the run.
//!
//! # Concurrency
//!
//! Many producers call [`Octree::insert`] on a shared reference. Descent
//! reads the per-slot atomic first-child index under the arena read lock;
//! appending to a leaf additionally holds that leaf's own mutex. A
//! leaf-to-branch promotion takes the arena write lock for the duration of
//! the split, so the children are fully built and populated before the
//! first-child index is published (Release store, Acquire loads). No lock
//! is ever held while waiting on another node's lock.
//!
//! Maintenance passes (interpolation, squeeze, assembly) take `&mut self`,
//! making the single-writer phase an ownership fact rather than a calling
//! convention.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

use glam::Vec3;
use smallvec::SmallVec;

use crate::config::TreeConfig;
use crate::sample::Sample;

use super::coord::NodeCoord;
use super::payload::LeafPayload;

/// Sentinel first-child index marking a leaf slot.
pub(crate) const NO_CHILD: u32 = u32::MAX;

/// Mutable per-node state guarded by the node's own mutex.
pub(crate) struct NodeState {
  /// Sample collection; meaningful only while the slot is a leaf.
  pub payload: LeafPayload,
  /// Maximally resolved: this leaf is terminal and never splits again.
  pub resolved: bool,
  /// Set by interpolation when no samples fell inside the search extent.
  pub empty: bool,
  /// Coarse grid used to reconstruct ancestors, built lazily.
  pub node_grid: Option<Vec<f32>>,
  /// Fine grid exported as a brick, built lazily.
  pub voxel_grid: Option<Vec<f32>>,
}

impl NodeState {
  fn new() -> Self {
    Self {
      payload: LeafPayload::new(),
      resolved: false,
      empty: false,
      node_grid: None,
      voxel_grid: None,
    }
  }

  /// Drop both grids and the empty flag. Called whenever the node's
  /// samples or children change under it.
  pub fn clear_grids(&mut self) {
    self.node_grid = None;
    self.voxel_grid = None;
    self.empty = false;
  }
}

/// One arena slot: a node's coordinate, topology link, and state.
pub(crate) struct NodeSlot {
  pub coord: NodeCoord,
  /// Index of the first of 8 contiguous children; `NO_CHILD` for a leaf.
  pub first_child: AtomicU32,
  pub state: Mutex<NodeState>,
}

impl NodeSlot {
  fn new(coord: NodeCoord) -> Self {
    Self {
      coord,
      first_child: AtomicU32::new(NO_CHILD),
      state: Mutex::new(NodeState::new()),
    }
  }

  #[inline]
  pub fn first_child(&self) -> Option<u32> {
    match self.first_child.load(Ordering::Acquire) {
      NO_CHILD => None,
      idx => Some(idx),
    }
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.first_child().is_none()
  }
}

/// Adaptive scattered-point octree over the normalized unit cube.
pub struct Octree {
  arena: RwLock<Vec<NodeSlot>>,
  config: TreeConfig,
  sample_count: AtomicU64,
  dropped_samples: AtomicU64,
  radius_bounds: Mutex<Option<(f32, f32)>>,
}

impl Octree {
  /// Create an empty tree holding only the root leaf.
  pub fn new(config: TreeConfig) -> Self {
    Self {
      arena: RwLock::new(vec![NodeSlot::new(NodeCoord::ROOT)]),
      config,
      sample_count: AtomicU64::new(0),
      dropped_samples: AtomicU64::new(0),
      radius_bounds: Mutex::new(None),
    }
  }

  /// The run-wide configuration this tree was built with.
  pub fn config(&self) -> &TreeConfig {
    &self.config
  }

  /// Insert a sample. Never fails: a sample whose octant test falls
  /// outside the valid range is dropped and counted, everything else is
  /// merged into the tree, possibly reshaping it.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, level = "trace"))]
  pub fn insert(&self, sample: Sample) {
    if !sample.in_unit_cube() {
      self.note_dropped(sample);
      return;
    }

    loop {
      let arena = self.arena.read().unwrap();

      // Branch descent: topology is immutable once published, so this
      // reads only atomics.
      let mut idx = 0usize;
      loop {
        let first = arena[idx].first_child.load(Ordering::Acquire);
        if first == NO_CHILD {
          break;
        }
        match arena[idx].coord.octant_of(sample.position) {
          Some(octant) => idx = first as usize + octant as usize,
          None => {
            drop(arena);
            self.note_dropped(sample);
            return;
          }
        }
      }

      let slot = &arena[idx];
      let mut state = slot.state.lock().unwrap();
      if slot.first_child.load(Ordering::Acquire) != NO_CHILD {
        // Promoted while we were acquiring the leaf lock; descend again.
        continue;
      }

      let level = slot.coord.level;
      let voxel = self.config.voxel_size(level);
      let can_split = level < self.config.max_depth;

      // The sample resolves finer than this leaf's voxels: promote.
      if can_split && !state.resolved && sample.spacing < voxel {
        drop(state);
        drop(arena);
        self.split_leaf(idx);
        continue;
      }

      state.payload.push(sample);
      self.sample_count.fetch_add(1, Ordering::Relaxed);

      if state.payload.len() > self.config.leaf_sample_cap {
        let resolution_adequate = state
          .payload
          .spacing_stats()
          .map(|stats| voxel <= stats.min)
          .unwrap_or(true);

        if resolution_adequate || state.resolved || !can_split {
          let coord = slot.coord;
          state.payload.rebin(&coord, self.config.rebin_dim);
        } else {
          drop(state);
          drop(arena);
          self.split_leaf(idx);
        }
      }
      return;
    }
  }

  /// Merge a frame's estimated search-radius bounds into the run-wide
  /// bounds used to seed the assembler's per-level radii.
  pub fn note_search_radius(&self, lo: f32, hi: f32) {
    let mut bounds = self.radius_bounds.lock().unwrap();
    *bounds = Some(match *bounds {
      Some((old_lo, old_hi)) => (old_lo.min(lo), old_hi.max(hi)),
      None => (lo, hi),
    });
  }

  /// Accumulated search-radius bounds, if any frame reported them.
  pub fn search_radius_bounds(&self) -> Option<(f32, f32)> {
    *self.radius_bounds.lock().unwrap()
  }

  /// Samples currently held by the tree.
  pub fn sample_count(&self) -> u64 {
    self.sample_count.load(Ordering::Relaxed)
  }

  /// Samples dropped because their position fell outside every octant.
  pub fn dropped_samples(&self) -> u64 {
    self.dropped_samples.load(Ordering::Relaxed)
  }

  /// Number of reachable nodes.
  pub fn node_count(&self) -> usize {
    let arena = self.arena.read().unwrap();
    count_subtree(&arena, 0, &mut |_| {})
  }

  /// Number of reachable leaves.
  pub fn leaf_count(&self) -> usize {
    let arena = self.arena.read().unwrap();
    let mut leaves = 0;
    count_subtree(&arena, 0, &mut |slot: &NodeSlot| {
      if slot.is_leaf() {
        leaves += 1;
      }
    });
    leaves
  }

  /// Coordinate of the leaf whose extent contains `position`.
  pub fn leaf_containing(&self, position: Vec3) -> Option<NodeCoord> {
    let arena = self.arena.read().unwrap();
    let mut idx = 0usize;
    loop {
      let slot = &arena[idx];
      match slot.first_child() {
        None => return Some(slot.coord),
        Some(first) => match slot.coord.octant_of(position) {
          Some(octant) => idx = first as usize + octant as usize,
          None => return None,
        },
      }
    }
  }

  /// Whether the node at `coord` is a leaf, or `None` if no exact node
  /// exists there.
  pub fn is_leaf(&self, coord: NodeCoord) -> Option<bool> {
    let arena = self.arena.read().unwrap();
    let (idx, exact) = find_slot(&arena, coord);
    exact.then(|| arena[idx].is_leaf())
  }

  /// Child coordinates of the branch at `coord`, in octant order.
  pub fn children_of(&self, coord: NodeCoord) -> Option<SmallVec<[NodeCoord; 8]>> {
    let arena = self.arena.read().unwrap();
    let (idx, exact) = find_slot(&arena, coord);
    if !exact {
      return None;
    }
    let first = arena[idx].first_child()? as usize;
    Some((0..8).map(|octant| arena[first + octant].coord).collect())
  }

  /// Samples held by the node at `coord` (clone; test and tooling aid).
  pub fn samples_at(&self, coord: NodeCoord) -> Option<Vec<Sample>> {
    let arena = self.arena.read().unwrap();
    let (idx, exact) = find_slot(&arena, coord);
    if !exact {
      return None;
    }
    let state = arena[idx].state.lock().unwrap();
    Some(state.payload.samples().to_vec())
  }

  /// Collect all samples whose position falls in the closed box.
  pub fn gather_in_box(&self, box_min: Vec3, box_max: Vec3) -> Vec<Sample> {
    let arena = self.arena.read().unwrap();
    let mut out = Vec::new();
    gather_subtree(&arena, 0, box_min, box_max, &mut out);
    out
  }

  /// Split the leaf at `idx`, if it still is one.
  fn split_leaf(&self, idx: usize) {
    let mut arena = self.arena.write().unwrap();
    if arena[idx].first_child.load(Ordering::Relaxed) != NO_CHILD {
      return;
    }
    split_slot(&mut arena, idx, &self.dropped_samples);
  }

  fn note_dropped(&self, sample: Sample) {
    self.dropped_samples.fetch_add(1, Ordering::Relaxed);
    #[cfg(feature = "tracing")]
    tracing::warn!(
      position = ?sample.position,
      "sample outside node extent dropped"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = sample;
  }

  pub(crate) fn arena(&self) -> RwLockReadGuard<'_, Vec<NodeSlot>> {
    self.arena.read().unwrap()
  }

  /// Disjoint borrows for the maintenance passes.
  pub(crate) fn parts_mut(&mut self) -> (&mut Vec<NodeSlot>, &TreeConfig, &AtomicU64) {
    (
      self.arena.get_mut().unwrap(),
      &self.config,
      &self.dropped_samples,
    )
  }
}

/// Descend towards `target` as deep as existing topology allows.
///
/// Returns the index of the deepest node on the path and whether it sits
/// exactly at `target`'s level (i.e. is the node addressed by `target`).
pub(crate) fn find_slot(arena: &[NodeSlot], target: NodeCoord) -> (usize, bool) {
  let mut idx = 0usize;
  loop {
    let coord = arena[idx].coord;
    if coord.level == target.level {
      return (idx, coord == target);
    }
    match arena[idx].first_child() {
      None => return (idx, false),
      Some(first) => {
        idx = first as usize + coord.octant_of_coord(&target) as usize;
      }
    }
  }
}

/// Split the leaf at `idx` into 8 contiguous children and redistribute its
/// samples by octant. Children are fully built before the first-child
/// index is published.
pub(crate) fn split_slot(arena: &mut Vec<NodeSlot>, idx: usize, dropped: &AtomicU64) -> u32 {
  let coord = arena[idx].coord;
  let samples = {
    let state = arena[idx].state.get_mut().unwrap();
    state.clear_grids();
    state.resolved = false;
    state.payload.take()
  };

  let first = arena.len() as u32;
  for octant in 0..8u8 {
    arena.push(NodeSlot::new(coord.child(octant)));
  }
  for sample in samples {
    match coord.octant_of(sample.position) {
      Some(octant) => {
        let child = &mut arena[first as usize + octant as usize];
        child.state.get_mut().unwrap().payload.push(sample);
      }
      None => {
        dropped.fetch_add(1, Ordering::Relaxed);
      }
    }
  }

  arena[idx].first_child.store(first, Ordering::Release);
  first
}

/// Descend to `target`, splitting leaves on the way so that an exact node
/// exists there. Maintenance-phase only.
pub(crate) fn ensure_slot(arena: &mut Vec<NodeSlot>, target: NodeCoord, dropped: &AtomicU64) -> usize {
  let mut idx = 0usize;
  loop {
    let coord = arena[idx].coord;
    if coord.level == target.level {
      return idx;
    }
    let first = match arena[idx].first_child() {
      Some(first) => first,
      None => split_slot(arena, idx, dropped),
    };
    idx = first as usize + coord.octant_of_coord(&target) as usize;
  }
}

/// Collect every sample of the subtree at `idx` inside the closed box.
pub(crate) fn gather_subtree(
  arena: &[NodeSlot],
  idx: usize,
  box_min: Vec3,
  box_max: Vec3,
  out: &mut Vec<Sample>,
) {
  let slot = &arena[idx];
  if !slot.coord.intersects(box_min, box_max) {
    return;
  }
  match slot.first_child() {
    Some(first) => {
      for octant in 0..8 {
        gather_subtree(arena, first as usize + octant, box_min, box_max, out);
      }
    }
    None => {
      let state = slot.state.lock().unwrap();
      for sample in state.payload.samples() {
        let p = sample.position;
        if p.x >= box_min.x
          && p.x <= box_max.x
          && p.y >= box_min.y
          && p.y <= box_max.y
          && p.z >= box_min.z
          && p.z <= box_max.z
        {
          out.push(*sample);
        }
      }
    }
  }
}

fn count_subtree(arena: &[NodeSlot], idx: usize, visit: &mut impl FnMut(&NodeSlot)) -> usize {
  let slot = &arena[idx];
  visit(slot);
  match slot.first_child() {
    None => 1,
    Some(first) => {
      let mut count = 1;
      for octant in 0..8 {
        count += count_subtree(arena, first as usize + octant, visit);
      }
      count
    }
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
