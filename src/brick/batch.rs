//! Batched brick interpolation.
//!
//! A stateless contract between the assembler and the interpolation kernel:
//! the assembler gathers samples into one flat slice, describes each brick
//! as a range plus an extent, and gets back dense bricks with the summary
//! statistics the population/leaf decisions need. Bricks are independent,
//! so the batch fans out over rayon.

use glam::Vec3;
use rayon::prelude::*;

use crate::octree::interpolate::eval_grid;
use crate::sample::Sample;

/// One brick to evaluate: a range into the batch's sample slice plus the
/// cube it covers.
#[derive(Debug, Clone, Copy)]
pub struct BrickJob {
  pub sample_offset: usize,
  pub sample_count: usize,
  pub min: Vec3,
  pub size: f32,
}

/// Dense brick values plus the statistics the assembler decides on.
#[derive(Debug, Clone)]
pub struct BrickResult {
  pub values: Vec<f32>,
  pub sum: f64,
  pub min: f32,
  pub variance: f64,
}

impl BrickResult {
  fn from_values(values: Vec<f32>) -> Self {
    let n = values.len() as f64;
    let mut sum = 0.0f64;
    let mut min = f32::INFINITY;
    for v in &values {
      sum += *v as f64;
      min = min.min(*v);
    }
    let mean = sum / n;
    let variance = values
      .iter()
      .map(|v| {
        let d = *v as f64 - mean;
        d * d
      })
      .sum::<f64>()
      / n;
    Self {
      values,
      sum,
      min,
      variance,
    }
  }
}

/// Evaluate every job against its slice of `samples`. Pure: no tree access,
/// no shared state, output order matches job order.
pub fn interpolate_bricks(samples: &[Sample], jobs: &[BrickJob], dim: usize) -> Vec<BrickResult> {
  jobs
    .par_iter()
    .map(|job| {
      let slice = &samples[job.sample_offset..job.sample_offset + job.sample_count];
      BrickResult::from_values(eval_grid(slice, job.min, job.size, dim))
    })
    .collect()
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
