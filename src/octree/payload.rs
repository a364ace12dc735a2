//! LeafPayload - the sample collection owned by a leaf node.
//!
//! A leaf either accumulates raw points (`Cloud`) or holds one
//! centroid-averaged point per occupied cell of the secondary re-binning
//! grid (`Bins`). Both kinds flow through the same split, re-bin, and
//! interpolation paths; the tag only records how the points were produced.

use glam::Vec3;

use crate::sample::Sample;

use super::coord::NodeCoord;

/// Tagged sample collection of a leaf.
#[derive(Clone, Debug)]
pub enum LeafPayload {
  /// Raw accumulated points, in insertion order.
  Cloud(Vec<Sample>),
  /// One centroid-averaged point per occupied re-bin cell, in cell order.
  Bins(Vec<Sample>),
}

/// Interdistance statistics over a payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpacingStats {
  pub min: f32,
  pub max: f32,
  pub avg: f32,
}

impl LeafPayload {
  /// Create an empty cloud payload.
  pub fn new() -> Self {
    Self::Cloud(Vec::new())
  }

  /// Samples held by this payload, regardless of kind.
  #[inline]
  pub fn samples(&self) -> &[Sample] {
    match self {
      Self::Cloud(samples) | Self::Bins(samples) => samples,
    }
  }

  /// Number of samples held.
  #[inline]
  pub fn len(&self) -> usize {
    self.samples().len()
  }

  /// True when no samples are held.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.samples().is_empty()
  }

  /// Append a sample. Binned payloads keep accumulating raw points on top
  /// of their centroids until the next re-bin folds everything together.
  pub fn push(&mut self, sample: Sample) {
    match self {
      Self::Cloud(samples) | Self::Bins(samples) => samples.push(sample),
    }
  }

  /// Take all samples out, leaving an empty cloud. Used by splits.
  pub fn take(&mut self) -> Vec<Sample> {
    let samples = match self {
      Self::Cloud(samples) | Self::Bins(samples) => std::mem::take(samples),
    };
    *self = Self::Cloud(Vec::new());
    samples
  }

  /// Interdistance statistics, or `None` when empty.
  pub fn spacing_stats(&self) -> Option<SpacingStats> {
    let samples = self.samples();
    if samples.is_empty() {
      return None;
    }
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    for sample in samples {
      min = min.min(sample.spacing);
      max = max.max(sample.spacing);
      sum += sample.spacing as f64;
    }
    Some(SpacingStats {
      min,
      max,
      avg: (sum / samples.len() as f64) as f32,
    })
  }

  /// Replace the payload with centroid-averaged points, one per occupied
  /// cell of the fixed secondary grid over `coord`'s extent.
  ///
  /// Positions, weights, and spacings are all averaged per cell; the result
  /// is ordered by cell index, so re-binning is deterministic for a given
  /// input order.
  pub fn rebin(&mut self, coord: &NodeCoord, rebin_dim: usize) {
    let samples = self.take();
    if samples.is_empty() {
      *self = Self::Bins(Vec::new());
      return;
    }

    #[derive(Clone, Copy, Default)]
    struct CellAccum {
      position: Vec3,
      weight: f64,
      spacing: f64,
      count: u32,
    }

    let mut cells = vec![CellAccum::default(); rebin_dim * rebin_dim * rebin_dim];
    let min = coord.min();
    let cell_size = coord.size() / rebin_dim as f32;
    let top = rebin_dim - 1;

    for sample in &samples {
      let rel = (sample.position - min) / cell_size;
      // Clamp instead of dropping: anything a split or re-bin already
      // accepted stays in the nearest boundary cell.
      let cx = (rel.x.floor() as isize).clamp(0, top as isize) as usize;
      let cy = (rel.y.floor() as isize).clamp(0, top as isize) as usize;
      let cz = (rel.z.floor() as isize).clamp(0, top as isize) as usize;
      let cell = &mut cells[(cz * rebin_dim + cy) * rebin_dim + cx];
      cell.position += sample.position;
      cell.weight += sample.weight as f64;
      cell.spacing += sample.spacing as f64;
      cell.count += 1;
    }

    let mut bins = Vec::new();
    for cell in &cells {
      if cell.count == 0 {
        continue;
      }
      let inv = 1.0 / cell.count as f32;
      bins.push(Sample {
        position: cell.position * inv,
        weight: (cell.weight / cell.count as f64) as f32,
        spacing: (cell.spacing / cell.count as f64) as f32,
      });
    }
    *self = Self::Bins(bins);
  }
}

impl Default for LeafPayload {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
#[path = "payload_test.rs"]
mod payload_test;
